//! Fatal boot failures.
//!
//! Every failure in the loader pipeline funnels into `BootError`; the loader
//! reports it and halts. None of these are recoverable.

use core::fmt;

/// Why the CPU cannot run this kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CapabilityError {
    /// The CPUID instruction itself is unavailable.
    NoCpuid,
    /// CPUID exists but the extended feature leaf does not.
    NoExtendedLeaf,
    /// No 64-bit long mode.
    NoLongMode,
    /// No 1 GiB pages; the identity mapping depends on them.
    NoHugePages,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootError {
    CapabilityMissing(CapabilityError),
    /// The firmware memory-map query failed outright.
    MemoryMapFailure,
    /// No usable region satisfies the load placement requirement.
    NoSuitableMemory,
    /// The A20 line is masked and memory above 1 MiB aliases.
    A20Unavailable,
    /// A firmware disk transfer reported an error.
    DiskReadFailure,
    /// The volume does not look like FAT16 (bad signature).
    FilesystemInvalid,
    /// The kernel image is not present in the root directory.
    FileNotFound,
    /// A cluster chain refers to a cluster marked bad.
    BadCluster,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CapabilityError::NoCpuid => "CPUID instruction not available",
            CapabilityError::NoExtendedLeaf => "CPUID extended feature leaf not available",
            CapabilityError::NoLongMode => "CPU does not support long mode",
            CapabilityError::NoHugePages => "CPU does not support 1 GiB pages",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::CapabilityMissing(inner) => write!(f, "cpu check failed: {inner}"),
            BootError::MemoryMapFailure => f.write_str("firmware memory map query failed"),
            BootError::NoSuitableMemory => {
                f.write_str("no usable memory region fits the kernel image")
            }
            BootError::A20Unavailable => f.write_str("A20 line is disabled"),
            BootError::DiskReadFailure => f.write_str("disk read failed"),
            BootError::FilesystemInvalid => f.write_str("boot partition is not a FAT16 volume"),
            BootError::FileNotFound => f.write_str("kernel image not found on boot partition"),
            BootError::BadCluster => f.write_str("kernel image cluster chain hits a bad cluster"),
        }
    }
}

impl From<CapabilityError> for BootError {
    fn from(err: CapabilityError) -> BootError {
        BootError::CapabilityMissing(err)
    }
}
