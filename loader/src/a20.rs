//! A20 line detection.
//!
//! With A20 masked, physical addresses wrap at 1 MiB: a write to a low
//! address shows up exactly 1 MiB higher. Two complementary patterns rule
//! out the high byte coincidentally matching. Detection only; if the
//! firmware left the line disabled the boot fails rather than fiddling with
//! the keyboard controller.
//!
//! The high probe address is only reachable once the flat segment limits
//! from the big real mode switch are in place.

/// Scratch byte in guaranteed-free low conventional memory.
#[cfg(target_os = "none")]
const PROBE_LOW: usize = 0x0500;
#[cfg(target_os = "none")]
const PROBE_HIGH: usize = PROBE_LOW + 0x10_0000;

#[cfg(target_os = "none")]
pub fn is_enabled() -> bool {
    // If the line is masked, both probes observe their own pattern through
    // the alias. If it is enabled, high memory is independent of the low
    // write and cannot match both patterns.
    unsafe { probe(0x55) || probe(0xAA) }
}

/// Writes `pattern` low and reports whether the high alias stayed
/// different. Restores both bytes.
#[cfg(target_os = "none")]
unsafe fn probe(pattern: u8) -> bool {
    let low = PROBE_LOW as *mut u8;
    let high = PROBE_HIGH as *mut u8;

    unsafe {
        let saved_low = low.read_volatile();
        let saved_high = high.read_volatile();

        low.write_volatile(pattern);
        let aliased = high.read_volatile() == pattern;

        low.write_volatile(saved_low);
        high.write_volatile(saved_high);

        !aliased
    }
}
