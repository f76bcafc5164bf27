//! The fixed physical-address plan both boot stages agree on.
//!
//! Every magic address in the boot path lives here as a named extent of
//! `LAYOUT`. The windows must not overlap; that is checked at compile time.

use crate::memory::{Length, PhysExtent, VirtAddress, MAX_REGIONS};

use static_assertions::const_assert;

pub struct BootLayout {
    /// Where the loader-to-kernel handoff structure is written.
    pub handoff: PhysExtent,
    /// Raw firmware memory-map records land here during the survey.
    pub mem_map_buffer: PhysExtent,
    /// Low bounce buffer for firmware disk reads; must stay under 1 MiB.
    pub disk_staging: PhysExtent,
    /// The disk-read request packet firmware reads through DS:SI. Zeroed
    /// real-mode segments only reach the first 64 KiB, so it gets a fixed
    /// low slot instead of living on the stack.
    pub disk_packet: PhysExtent,
    /// The four boot page tables, in CR3 order.
    pub page_tables: PhysExtent,
    /// Kernel stack; its end is the initial stack top.
    pub kernel_stack: PhysExtent,
    /// High window the raw disk image is copied into.
    pub disk_window: PhysExtent,
    /// Where the kernel image file is unpacked.
    pub kernel_image: PhysExtent,
    /// Byte offset of the FAT16 partition within the disk image.
    pub partition_offset: Length,
    /// Virtual base the kernel image is mapped at.
    pub kernel_virt_base: VirtAddress,
}

pub const LAYOUT: BootLayout = BootLayout {
    handoff: PhysExtent::from_raw(0x8000, 0x1000),
    mem_map_buffer: PhysExtent::from_raw(0x9000, (MAX_REGIONS * 24) as u64),
    disk_staging: PhysExtent::from_raw(0x6_0000, 100 * 512),
    disk_packet: PhysExtent::from_raw(0x7000, 16),
    page_tables: PhysExtent::from_raw(0x7_0000, 4 * 4096),
    kernel_stack: PhysExtent::from_raw(0x800_0000, 0x1_0000),
    disk_window: PhysExtent::from_raw(0x100_0000, 0x200_0000),
    kernel_image: PhysExtent::from_raw(0x740_0000, 0xC0_0000),
    partition_offset: Length::from_raw(0x7E00),
    kernel_virt_base: VirtAddress::from_raw(0xFFFF_FFFF_8000_0000),
};

impl BootLayout {
    /// The physical span that must be backed by usable memory: everything
    /// from the start of the disk window through the kernel stack.
    pub fn required_region(&self) -> PhysExtent {
        PhysExtent::from_range_exclusive(
            self.disk_window.address(),
            self.kernel_stack.end_address(),
        )
    }

    /// Initial stack top handed to the kernel. The low gigabyte is identity
    /// mapped, so the physical end address doubles as a virtual one.
    pub fn stack_top(&self) -> VirtAddress {
        VirtAddress::from_raw(self.kernel_stack.end_address().as_raw())
    }
}

const fn disjoint(a: PhysExtent, b: PhysExtent) -> bool {
    let a_end = a.address.as_raw() + a.length.as_raw();
    let b_end = b.address.as_raw() + b.length.as_raw();
    a_end <= b.address.as_raw() || b_end <= a.address.as_raw()
}

const fn windows_disjoint(layout: &BootLayout) -> bool {
    let windows = [
        layout.handoff,
        layout.mem_map_buffer,
        layout.disk_staging,
        layout.disk_packet,
        layout.page_tables,
        layout.kernel_stack,
        layout.disk_window,
        layout.kernel_image,
    ];

    let mut i = 0;
    while i < windows.len() {
        let mut j = i + 1;
        while j < windows.len() {
            if !disjoint(windows[i], windows[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }

    true
}

const_assert!(windows_disjoint(&LAYOUT));

// The staging buffer is the only window firmware writes to; it must be
// addressable in real mode.
const_assert!(LAYOUT.disk_staging.address.as_raw() + LAYOUT.disk_staging.length.as_raw() <= 0x10_0000);

// Firmware reaches these through zero-based 16-bit segment:offset pointers,
// so they must sit in the first 64 KiB.
const_assert!(LAYOUT.disk_packet.address.as_raw() + LAYOUT.disk_packet.length.as_raw() <= 0x1_0000);
const_assert!(LAYOUT.mem_map_buffer.address.as_raw() + LAYOUT.mem_map_buffer.length.as_raw() <= 0x1_0000);

// Both ends of the kernel mapping are built from 2 MiB pages.
const_assert!(LAYOUT.kernel_image.address.as_raw() % 0x20_0000 == 0);
const_assert!(LAYOUT.kernel_virt_base.as_raw() % 0x20_0000 == 0);
