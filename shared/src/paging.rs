//! Construction of the boot page tables.
//!
//! The loader builds exactly four tables: a PML4, a PDPT identity-mapping the
//! low gigabyte with one huge entry, and a PDPT/PD pair mapping the kernel
//! image high with 2 MiB pages. `BootTables` is built as a plain value and
//! copied into its physical window in one step, so everything up to the copy
//! is testable on a hosted target.

use crate::layout::BootLayout;
use crate::memory::{Length, PhysAddress, VirtAddress};

use bitflags::bitflags;

pub const ENTRY_COUNT: usize = 512;
pub const PAGE_SIZE: u64 = 4096;
pub const HUGE_PAGE_1G: u64 = 1 << 30;
pub const HUGE_PAGE_2M: u64 = 2 * 1024 * 1024;

/// PML4 slot pointing back at the PML4 itself, so the kernel can reach the
/// tables through virtual memory later.
pub const SELF_MAP_SLOT: usize = 510;

const FRAME_MASK: u64 = 0x000F_FFFF_FFFF_F000;

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EntryFlags: u64 {
        const PRESENT = 1;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        /// In a PDPT or PD entry: map a huge page instead of pointing at the
        /// next table.
        const HUGE = 1 << 7;
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(transparent)]
pub struct Entry(u64);

impl Entry {
    pub const fn zero() -> Entry {
        Entry(0)
    }

    pub fn new(frame: PhysAddress, flags: EntryFlags) -> Entry {
        assert!(frame.is_aligned_to(PAGE_SIZE));
        Entry(frame.as_raw() | flags.bits())
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    pub fn frame(self) -> PhysAddress {
        PhysAddress::from_raw(self.0 & FRAME_MASK)
    }

    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl core::fmt::Debug for Entry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entry")
            .field("frame", &self.frame())
            .field("flags", &self.flags())
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
#[repr(C, align(4096))]
pub struct Table {
    pub entries: [Entry; ENTRY_COUNT],
}

impl Table {
    pub const fn empty() -> Table {
        Table {
            entries: [Entry::zero(); ENTRY_COUNT],
        }
    }
}

pub fn pml4_index(addr: VirtAddress) -> usize {
    (addr.as_raw() >> 39) as usize & 0o777
}

pub fn pdpt_index(addr: VirtAddress) -> usize {
    (addr.as_raw() >> 30) as usize & 0o777
}

pub fn pd_index(addr: VirtAddress) -> usize {
    (addr.as_raw() >> 21) as usize & 0o777
}

/// The four boot tables in the order they sit in their physical window.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct BootTables {
    pub pml4: Table,
    pub identity_pdpt: Table,
    pub kernel_pdpt: Table,
    pub kernel_pd: Table,
}

impl BootTables {
    /// Builds the table contents for `layout`. Panics if the layout cannot
    /// be expressed (misaligned windows, kernel image too large for one PD,
    /// or a kernel base colliding with the identity or self-map slots).
    pub fn build(layout: &BootLayout) -> BootTables {
        let window = layout.page_tables.address();
        assert!(window.is_aligned_to(PAGE_SIZE));
        assert!(layout.page_tables.length().as_raw() >= 4 * PAGE_SIZE);

        let pml4_at = window;
        let identity_pdpt_at = pml4_at.offset_by(Length::from_raw(PAGE_SIZE));
        let kernel_pdpt_at = identity_pdpt_at.offset_by(Length::from_raw(PAGE_SIZE));
        let kernel_pd_at = kernel_pdpt_at.offset_by(Length::from_raw(PAGE_SIZE));

        let virt_base = layout.kernel_virt_base;
        let image = layout.kernel_image;
        assert!(virt_base.is_aligned_to(HUGE_PAGE_2M));
        assert!(image.address().is_aligned_to(HUGE_PAGE_2M));

        let pml4_slot = pml4_index(virt_base);
        assert!(pml4_slot != 0 && pml4_slot != SELF_MAP_SLOT);

        let mut tables = BootTables {
            pml4: Table::empty(),
            identity_pdpt: Table::empty(),
            kernel_pdpt: Table::empty(),
            kernel_pd: Table::empty(),
        };

        let table_flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
        let huge_flags = table_flags | EntryFlags::HUGE;

        // Identity map the low gigabyte; the loader, the handoff structure
        // and the kernel stack all live there.
        tables.pml4.entries[0] = Entry::new(identity_pdpt_at, table_flags);
        tables.identity_pdpt.entries[0] = Entry::new(PhysAddress::zero(), huge_flags);

        // Map the kernel image at its high virtual base with 2 MiB pages.
        tables.pml4.entries[pml4_slot] = Entry::new(kernel_pdpt_at, table_flags);
        tables.kernel_pdpt.entries[pdpt_index(virt_base)] = Entry::new(kernel_pd_at, table_flags);

        let pages = image.length().align_up(HUGE_PAGE_2M).as_raw() / HUGE_PAGE_2M;
        let first_pd_slot = pd_index(virt_base);
        assert!(first_pd_slot + pages as usize <= ENTRY_COUNT);

        for i in 0..pages {
            let frame = image
                .address()
                .offset_by(Length::from_raw(i * HUGE_PAGE_2M));
            tables.kernel_pd.entries[first_pd_slot + i as usize] = Entry::new(frame, huge_flags);
        }

        tables.pml4.entries[SELF_MAP_SLOT] = Entry::new(pml4_at, table_flags);

        tables
    }

    /// The physical address CR3 should be loaded with.
    pub fn pml4_address(layout: &BootLayout) -> PhysAddress {
        layout.page_tables.address()
    }

    /// Copies the built tables into their physical window.
    ///
    /// # Safety
    ///
    /// `dest` must point at `layout.page_tables` worth of otherwise-unused
    /// memory, writable at its physical address.
    pub unsafe fn install_at(&self, dest: *mut BootTables) {
        unsafe {
            core::ptr::copy_nonoverlapping(self, dest, 1);
        }
    }
}
