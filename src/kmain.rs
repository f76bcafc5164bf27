//! Kernel entry and bring-up order.

use core::fmt::Write;
use core::panic::PanicInfo;

use lazy_static::lazy_static;
use log::{error, info};
use x86_64::instructions::interrupts;

use shared::handoff::BootInfo;
use shared::interrupt::TrapFrame;

use crate::{gdt, idt, pic};

const VMEM: *mut u8 = 0xB8000 as *mut u8;

/// First Rust code in long mode. The loader guarantees paging is on, the
/// stack is valid, interrupts are disabled, and `boot_info` points at the
/// handoff structure in identity-mapped memory.
#[no_mangle]
pub extern "C" fn kernel_entry(boot_info: *const BootInfo) -> ! {
    init_logger();

    info!("in kernel");

    // Copy it out before anything can scribble over low memory.
    let boot_info: BootInfo = unsafe { (*boot_info).clone() };

    gdt::init();
    info!("set up GDT and TSS");

    idt::init();
    info!("set up IDT");

    unsafe {
        pic::init();
    }
    pic::install_irq_handler(0, Some(timer_handler));
    pic::install_irq_handler(1, Some(keyboard_handler));
    info!("set up PIC");

    for entry in boot_info.mem_map.entries() {
        info!(
            "memory: {:#014x}..{:#014x} {:?}",
            entry.extent.address().as_raw(),
            entry.extent.end_address().as_raw(),
            entry.mem_type,
        );
    }
    info!(
        "kernel region {:#x}..{:#x}, stack top {:#x}",
        boot_info.kernel_region.address().as_raw(),
        boot_info.kernel_region.end_address().as_raw(),
        boot_info.stack_top.as_raw(),
    );

    interrupts::enable();
    info!("interrupts enabled");

    halt_loop()
}

fn timer_handler(_frame: &TrapFrame) {
    // Nothing to schedule yet.
}

fn keyboard_handler(_frame: &TrapFrame) {
    // Drain the scancode so the controller can raise the next IRQ.
    let scancode: u8 = unsafe { x86_64::instructions::port::Port::new(0x60).read() };
    info!("keyboard: scancode {scancode:#x}");
}

fn halt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "qemu_debugcon")] {
        use shared::log::{LogTee, LogSink, QemuDebugWriter};
        use shared::vga::VgaWriter;
        lazy_static! {
            static ref LOGGER: LogTee<LogSink<QemuDebugWriter>, LogSink<VgaWriter>> = unsafe {
                LogTee(
                    LogSink::new(QemuDebugWriter::new()),
                    LogSink::new(VgaWriter::new(VMEM)),
                )
            };
        }
    } else {
        use shared::log::LogSink;
        use shared::vga::VgaWriter;
        lazy_static! {
            static ref LOGGER: LogSink<VgaWriter> = unsafe { LogSink::new(VgaWriter::new(VMEM)) };
        }
    }
}

fn init_logger() {
    log::set_logger(&*LOGGER).unwrap();
    log::set_max_level(log::LevelFilter::Info);
}

#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    use shared::log::LogExt;

    // It is unlikely we panicked while LOGGER was locked, and if we did
    // we'll likely triple fault anyway. Try the existing LOGGER first and
    // fall back to fresh writers.
    if !LOGGER.is_locked() {
        error!("{info}");
    } else {
        #[cfg(feature = "qemu_debugcon")]
        {
            let mut writer = unsafe { shared::log::QemuDebugWriter::new() };
            let _ = write!(&mut writer, "{info}");
        }

        let mut writer = unsafe { shared::vga::VgaWriter::new(VMEM) };
        let _ = write!(&mut writer, "{info}");
    }
    interrupts::disable();
    halt_loop();
}
