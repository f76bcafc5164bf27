//! Code shared by the loader and the kernel.
//!
//! This crate contains the parts of the boot path that are pure logic:
//! memory-map bookkeeping, the FAT16 reader, page-table construction and
//! descriptor encoding. Keeping them here means they build and unit test on a
//! hosted target; the two binaries only add the hardware calls around them.
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(not(test), no_std)]

#[cfg(test)]
extern crate std;

pub mod error;
pub mod fat16;
pub mod handoff;
pub mod interrupt;
pub mod layout;
pub mod log;
pub mod memory;
pub mod paging;
pub mod segment;
pub mod vga;
