//! Logging plumbing for the `log` crate facade.
//!
//! Both binaries install one of these as the global logger. Sinks format to
//! any `core::fmt::Write`; the tee fans a record out to two sinks so output
//! can go to the screen and the debug port at once.

use core::fmt::Write;

use ::log::{Level, Log, Metadata, Record};
use spin::Mutex;

/// Extra probe the panic path needs: if a logging call itself panicked, the
/// sink's lock is still held and the panic handler must fall back to writing
/// the screen directly instead of deadlocking.
pub trait LogExt {
    fn is_locked(&self) -> bool;
}

/// Formats records to a `core::fmt::Write` impl behind a spinlock.
pub struct LogSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LogSink<W> {
    pub fn new(writer: W) -> Self {
        LogSink {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> Log for LogSink<W> {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut writer = self.writer.lock();
        let _ = writeln!(
            &mut writer,
            "[{}] {}: {}",
            level_tag(record.level()),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // Writers here have no buffer to flush.
    }
}

impl<W: Write + Send> LogExt for LogSink<W> {
    fn is_locked(&self) -> bool {
        self.writer.is_locked()
    }
}

fn level_tag(level: Level) -> &'static str {
    use Level::*;

    match level {
        Error => "ERROR",
        Warn => " WARN",
        Info => " INFO",
        Debug => "DEBUG",
        Trace => "TRACE",
    }
}

/// Forwards every record to both loggers, first then second.
pub struct LogTee<L1, L2>(pub L1, pub L2);

impl<L1: Log, L2: Log> Log for LogTee<L1, L2> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.0.enabled(metadata) || self.1.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.0.log(record);
        self.1.log(record);
    }

    fn flush(&self) {
        self.0.flush();
        self.1.flush();
    }
}

impl<L1: LogExt, L2: LogExt> LogExt for LogTee<L1, L2> {
    fn is_locked(&self) -> bool {
        self.0.is_locked() || self.1.is_locked()
    }
}

/// QEMU's debugcon port.
const DEBUG_PORT: u16 = 0xE9;

/// Writes to QEMU's debug port; a no-op on real hardware.
pub struct QemuDebugWriter {
    _not_send_by_default: core::marker::PhantomData<*mut u8>,
}

unsafe impl Send for QemuDebugWriter {}

impl QemuDebugWriter {
    /// # Safety
    ///
    /// Caller must ensure x86 port 0xE9 is safe to write to.
    pub unsafe fn new() -> Self {
        QemuDebugWriter {
            _not_send_by_default: core::marker::PhantomData,
        }
    }
}

impl Write for QemuDebugWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        s.bytes().for_each(|b| unsafe { debug_out(b) });
        Ok(())
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn debug_out(byte: u8) {
    let mut port = x86_64::instructions::port::PortWriteOnly::new(DEBUG_PORT);
    unsafe { port.write(byte) };
}

// The `x86_64` crate only provides port access on 64-bit targets; the
// 16-bit loader build writes the port directly.
#[cfg(target_arch = "x86")]
unsafe fn debug_out(byte: u8) {
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") DEBUG_PORT,
            in("al") byte,
            options(nostack, nomem),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::string::String;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<String>>);

    impl Write for CaptureWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            self.0.lock().push_str(s);
            Ok(())
        }
    }

    fn record(args: core::fmt::Arguments) -> String {
        let capture = CaptureWriter::default();
        let sink = LogSink::new(capture.clone());
        sink.log(
            &Record::builder()
                .level(Level::Info)
                .target("boot")
                .args(args)
                .build(),
        );
        let out = capture.0.lock().clone();
        out
    }

    #[test]
    fn sink_formats_level_target_and_message() {
        assert_eq!(record(format_args!("hello")), "[ INFO] boot: hello\n");
    }

    #[test]
    fn tee_writes_both_sinks() {
        let a = CaptureWriter::default();
        let b = CaptureWriter::default();
        let tee = LogTee(LogSink::new(a.clone()), LogSink::new(b.clone()));
        tee.log(
            &Record::builder()
                .level(Level::Warn)
                .target("boot")
                .args(format_args!("x"))
                .build(),
        );
        assert_eq!(*a.0.lock(), *b.0.lock());
        assert!(!tee.is_locked());
    }
}
