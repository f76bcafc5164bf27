//! CPU capability verification.
//!
//! The decision logic is pure and tested; only gathering the register
//! snapshot needs the hardware.

use shared::error::CapabilityError;

#[cfg(target_os = "none")]
use shared::error::BootError;

/// First extended CPUID leaf; EAX reports the highest one supported.
pub const EXTENDED_LEAF_BASE: u32 = 0x8000_0000;
/// Extended feature leaf carrying the long mode and huge page bits.
pub const FEATURE_LEAF: u32 = 0x8000_0001;

/// EDX bit: long mode.
pub const EDX_LONG_MODE: u32 = 1 << 29;
/// EDX bit: 1 GiB pages.
pub const EDX_HUGE_PAGES: u32 = 1 << 26;

/// What the probe found.
#[derive(Clone, Copy, Debug)]
pub struct CpuidSnapshot {
    pub has_cpuid: bool,
    /// EAX of leaf `EXTENDED_LEAF_BASE`, zero if CPUID is absent.
    pub max_extended_leaf: u32,
    /// EDX of `FEATURE_LEAF`, zero if that leaf is unavailable.
    pub feature_edx: u32,
}

/// Checks are ordered so the reported error names the first missing
/// prerequisite, not a later one it implies.
pub fn check(snapshot: CpuidSnapshot) -> Result<(), CapabilityError> {
    if !snapshot.has_cpuid {
        return Err(CapabilityError::NoCpuid);
    }
    if snapshot.max_extended_leaf < FEATURE_LEAF {
        return Err(CapabilityError::NoExtendedLeaf);
    }
    if snapshot.feature_edx & EDX_LONG_MODE == 0 {
        return Err(CapabilityError::NoLongMode);
    }
    if snapshot.feature_edx & EDX_HUGE_PAGES == 0 {
        return Err(CapabilityError::NoHugePages);
    }
    Ok(())
}

#[cfg(target_os = "none")]
pub fn verify() -> Result<(), BootError> {
    check(snapshot()).map_err(BootError::from)
}

#[cfg(target_os = "none")]
fn snapshot() -> CpuidSnapshot {
    if !cpuid_present() {
        return CpuidSnapshot {
            has_cpuid: false,
            max_extended_leaf: 0,
            feature_edx: 0,
        };
    }

    let max_extended_leaf = cpuid(EXTENDED_LEAF_BASE).0;
    let feature_edx = if max_extended_leaf >= FEATURE_LEAF {
        cpuid(FEATURE_LEAF).1
    } else {
        0
    };

    CpuidSnapshot {
        has_cpuid: true,
        max_extended_leaf,
        feature_edx,
    }
}

/// CPUID exists iff the EFLAGS ID bit (21) can be toggled.
#[cfg(target_os = "none")]
fn cpuid_present() -> bool {
    let original: u32;
    let toggled: u32;
    unsafe {
        core::arch::asm!(
            "pushfd",
            "pop {original:e}",
            "mov {toggled:e}, {original:e}",
            // Bit 21 is the ID flag.
            "xor {toggled:e}, 0x200000",
            "push {toggled:e}",
            "popfd",
            "pushfd",
            "pop {toggled:e}",
            "push {original:e}",
            "popfd",
            original = out(reg) original,
            toggled = out(reg) toggled,
        );
    }
    original != toggled
}

/// Returns (EAX, EDX) of `leaf`.
#[cfg(target_os = "none")]
fn cpuid(leaf: u32) -> (u32, u32) {
    let eax: u32;
    let edx: u32;
    unsafe {
        // LLVM reserves EBX; park it in ESI around the call.
        core::arch::asm!(
            "mov esi, ebx",
            "cpuid",
            "mov ebx, esi",
            inout("eax") leaf => eax,
            out("edx") edx,
            out("ecx") _,
            out("esi") _,
        );
    }
    (eax, edx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> CpuidSnapshot {
        CpuidSnapshot {
            has_cpuid: true,
            max_extended_leaf: 0x8000_0008,
            feature_edx: EDX_LONG_MODE | EDX_HUGE_PAGES,
        }
    }

    #[test]
    fn accepts_capable_cpu() {
        assert_eq!(check(capable()), Ok(()));
    }

    #[test]
    fn rejects_missing_cpuid_first() {
        let snapshot = CpuidSnapshot {
            has_cpuid: false,
            ..capable()
        };
        assert_eq!(check(snapshot), Err(CapabilityError::NoCpuid));
    }

    #[test]
    fn rejects_missing_extended_leaf() {
        let snapshot = CpuidSnapshot {
            max_extended_leaf: EXTENDED_LEAF_BASE,
            ..capable()
        };
        assert_eq!(check(snapshot), Err(CapabilityError::NoExtendedLeaf));
    }

    #[test]
    fn rejects_missing_long_mode() {
        let snapshot = CpuidSnapshot {
            feature_edx: EDX_HUGE_PAGES,
            ..capable()
        };
        assert_eq!(check(snapshot), Err(CapabilityError::NoLongMode));
    }

    #[test]
    fn rejects_missing_huge_pages() {
        let snapshot = CpuidSnapshot {
            feature_edx: EDX_LONG_MODE,
            ..capable()
        };
        assert_eq!(check(snapshot), Err(CapabilityError::NoHugePages));
    }
}
