//! Bare VGA text-mode writer for boot diagnostics.

use core::fmt::Write;

const ROWS: usize = 25;
const COLS: usize = 80;

/// Light grey on black.
const ATTRIBUTE: u8 = 0x07;

pub struct VgaWriter {
    vmem: *mut u8,
    offset: usize,
}

// The raw pointer targets fixed video memory, not shared Rust data.
unsafe impl Send for VgaWriter {}

impl VgaWriter {
    /// # Safety
    ///
    /// `vmem` must point at the text-mode frame buffer and nothing else may
    /// write it.
    pub unsafe fn new(vmem: *mut u8) -> VgaWriter {
        let mut writer = VgaWriter { vmem, offset: 0 };
        writer.clear();
        writer
    }

    pub fn clear(&mut self) {
        for i in 0..ROWS * COLS {
            unsafe {
                self.vmem.offset(2 * i as isize).write_volatile(b' ');
                self.vmem.offset(2 * i as isize + 1).write_volatile(ATTRIBUTE);
            }
        }

        self.offset = 0;
    }

    fn put(&mut self, b: u8) {
        unsafe {
            self.vmem.offset(2 * self.offset as isize).write_volatile(b);
            self.vmem
                .offset(2 * self.offset as isize + 1)
                .write_volatile(ATTRIBUTE);
        }
        self.offset += 1;
    }
}

impl Write for VgaWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            // Wrap to the top once the screen fills; boot output is short
            // and losing the oldest lines beats losing the newest.
            if self.offset >= ROWS * COLS {
                self.clear();
            }

            if c == '\n' {
                self.offset = ((self.offset + COLS) / COLS) * COLS;
                continue;
            }

            let b = if c.is_ascii() { c as u8 } else { b'?' };
            self.put(b);
        }

        Ok(())
    }
}
