//! 64-bit kernel bootstrap: GDT/TSS, interrupt dispatch, PIC.
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

mod gdt;
mod idt;
#[cfg(target_os = "none")]
mod kmain;
mod pic;

// On a hosted target only the unit tests matter.
#[cfg(not(target_os = "none"))]
fn main() {}
