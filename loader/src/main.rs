//! Boot loader: from the 16-bit firmware entry to the 64-bit kernel.
//!
//! The pipeline is strictly ordered and every failure is fatal:
//! capability check, memory survey, mode probe, A20 check, disk pull,
//! FAT16 load, page tables, handoff, long-mode jump.
//!
//! On hardware this builds for the `x86-code16-boot` target, whose code16
//! LLVM triple emits instructions that decode correctly in real and big
//! real mode; `modes` keeps CS 16-bit through the protected windows to
//! match.
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

mod a20;
mod bios;
mod cpu;
mod disk;
mod memmap;
mod modes;

#[cfg(target_os = "none")]
mod boot {
    use core::convert::Infallible;
    use core::fmt::Write;
    use core::panic::PanicInfo;

    use lazy_static::lazy_static;
    use log::{error, info};

    use shared::error::BootError;
    use shared::fat16::{Fat16Error, Volume};
    use shared::handoff::BootInfo;
    use shared::layout::LAYOUT;
    use shared::log::{LogExt, LogSink, LogTee, QemuDebugWriter};
    use shared::memory::select_load_region;
    use shared::paging::BootTables;

    use crate::{a20, bios, cpu, disk, memmap, modes};

    /// Root directory name of the kernel image.
    const KERNEL_IMAGE_NAME: &str = "KERNEL.BIN";

    core::arch::global_asm!(include_str!("entry.s"), options(att_syntax, raw));

    cfg_if::cfg_if! {
        if #[cfg(feature = "qemu_debugcon")] {
            lazy_static! {
                static ref LOGGER: LogTee<LogSink<QemuDebugWriter>, LogSink<bios::TeletypeWriter>> =
                    LogTee(
                        // Nothing else touches the debug port.
                        LogSink::new(unsafe { QemuDebugWriter::new() }),
                        LogSink::new(bios::TeletypeWriter::new()),
                    );
            }
        } else {
            lazy_static! {
                static ref LOGGER: LogSink<bios::TeletypeWriter> =
                    LogSink::new(bios::TeletypeWriter::new());
            }
        }
    }

    #[no_mangle]
    extern "C" fn loader_main() -> ! {
        log::set_logger(&*LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Info);

        info!("loader: starting");

        match run() {
            Ok(never) => match never {},
            Err(err) => fatal(err),
        }
    }

    fn run() -> Result<Infallible, BootError> {
        cpu::verify()?;
        info!("cpu: long mode and 1 GiB pages available");

        let map = memmap::survey()?;
        info!("memory: {} regions reported", map.entries().len());

        let required = LAYOUT.required_region();
        let region = select_load_region(&map, required.address(), required.length())?;
        info!(
            "memory: kernel region {:#x}..{:#x}",
            region.address().as_raw(),
            region.end_address().as_raw()
        );

        // One round trip through protected mode leaves the flat segment
        // limits cached; after this, 32-bit addresses work from real mode.
        unsafe {
            modes::enter_protected_probe();
            modes::drop_to_big_real();
        }
        info!("modes: big real mode active");

        // Needs the flat limits: the probe touches memory above 1 MiB.
        if !a20::is_enabled() {
            return Err(BootError::A20Unavailable);
        }
        info!("a20: enabled");

        disk::read_disk_image()?;
        info!("disk: image staged at {:#x}", LAYOUT.disk_window.address().as_raw());

        load_kernel_image()?;
        info!("fat16: {} loaded", KERNEL_IMAGE_NAME);

        let tables = BootTables::build(&LAYOUT);
        unsafe {
            tables.install_at(LAYOUT.page_tables.address().as_raw() as usize as *mut BootTables);
        }

        let boot_info = BootInfo {
            mem_map: map,
            kernel_region: region,
            stack_top: LAYOUT.stack_top(),
        };
        let handoff_ptr = LAYOUT.handoff.address().as_raw() as usize as *mut BootInfo;
        unsafe {
            core::ptr::write(handoff_ptr, boot_info);
        }

        info!("modes: jumping to long mode");
        unsafe {
            modes::enter_protected_final();
            modes::enter_long_mode(
                BootTables::pml4_address(&LAYOUT),
                LAYOUT.kernel_virt_base,
                LAYOUT.stack_top(),
                handoff_ptr,
            )
        }
    }

    /// Finds and unpacks the kernel image out of the staged FAT16 partition.
    fn load_kernel_image() -> Result<(), BootError> {
        let partition_start = LAYOUT
            .disk_window
            .address()
            .offset_by(LAYOUT.partition_offset);
        let partition_len =
            LAYOUT.disk_window.length().subtract(LAYOUT.partition_offset);

        // The staged image and the unpack window are loader-owned physical
        // memory named by the layout; nothing else aliases them.
        let volume_bytes = unsafe {
            core::slice::from_raw_parts(
                partition_start.as_raw() as usize as *const u8,
                partition_len.as_raw() as usize,
            )
        };
        let dest = unsafe {
            core::slice::from_raw_parts_mut(
                LAYOUT.kernel_image.address().as_raw() as usize as *mut u8,
                LAYOUT.kernel_image.length().as_raw() as usize,
            )
        };

        let volume = Volume::open(volume_bytes).map_err(|err| match err {
            Fat16Error::InvalidSignature => BootError::FilesystemInvalid,
            Fat16Error::BadCluster => BootError::BadCluster,
        })?;

        match volume.load_file(KERNEL_IMAGE_NAME, dest) {
            Ok(true) => Ok(()),
            Ok(false) => Err(BootError::FileNotFound),
            Err(Fat16Error::BadCluster) => Err(BootError::BadCluster),
            Err(Fat16Error::InvalidSignature) => Err(BootError::FilesystemInvalid),
        }
    }

    fn fatal(err: BootError) -> ! {
        error!("boot failed: {err}");
        halt()
    }

    fn halt() -> ! {
        loop {
            unsafe {
                core::arch::asm!("hlt");
            }
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        if !LOGGER.is_locked() {
            error!("loader panic: {info}");
        } else {
            // The logger died mid-write; bypass it.
            let mut writer = bios::TeletypeWriter::new();
            let _ = write!(writer, "\nloader panic: {info}");
        }
        halt()
    }
}

// On a hosted target only the unit tests matter.
#[cfg(not(target_os = "none"))]
fn main() {}
