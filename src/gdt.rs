//! Kernel GDT and TSS.
//!
//! The table contents are built as a value so the encoding is testable; only
//! loading the descriptor tables and segment registers touches hardware.

use core::mem::size_of;
use core::sync::atomic::{AtomicBool, Ordering};

use shared::segment::{selector, SegmentDescriptor, TaskStateSegment, TssDescriptor};
use static_assertions::const_assert_eq;

/// The fixed descriptor order the `selector` constants index into.
#[repr(C)]
struct GdtImage {
    null: SegmentDescriptor,
    kernel_code: SegmentDescriptor,
    kernel_data: SegmentDescriptor,
    user_code: SegmentDescriptor,
    user_data: SegmentDescriptor,
    tss: TssDescriptor,
}

const_assert_eq!(size_of::<GdtImage>(), 7 * 8);

fn build(tss_base: u64) -> GdtImage {
    GdtImage {
        null: SegmentDescriptor::null(),
        kernel_code: SegmentDescriptor::kernel_code64(),
        kernel_data: SegmentDescriptor::kernel_data(),
        user_code: SegmentDescriptor::user_code64(),
        user_data: SegmentDescriptor::user_data(),
        tss: TssDescriptor::new(tss_base, (size_of::<TaskStateSegment>() - 1) as u32),
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

// Loaded into hardware registers by address; unavoidably static mut.
static mut TSS: TaskStateSegment = TaskStateSegment::new();
static mut GDT: GdtImage = GdtImage {
    null: SegmentDescriptor::null(),
    kernel_code: SegmentDescriptor::null(),
    kernel_data: SegmentDescriptor::null(),
    user_code: SegmentDescriptor::null(),
    user_data: SegmentDescriptor::null(),
    tss: TssDescriptor::null(),
};

#[cfg(target_os = "none")]
pub fn init() {
    use x86_64::instructions::tables::{lgdt, load_tss};
    use x86_64::registers::segmentation::{Segment, CS, DS, ES, SS};
    use x86_64::structures::gdt::SegmentSelector;
    use x86_64::structures::DescriptorTablePointer;
    use x86_64::VirtAddr;

    assert!(
        !INITIALIZED.swap(true, Ordering::SeqCst),
        "GDT initialized twice"
    );

    unsafe {
        // The interrupt stubs run on the same stack the kernel entered on;
        // ring transitions would need their own, which nothing uses yet.
        TSS.privilege_stacks[0] = shared::layout::LAYOUT.stack_top().as_raw();

        GDT = build(core::ptr::addr_of!(TSS) as u64);

        let pointer = DescriptorTablePointer {
            limit: (size_of::<GdtImage>() - 1) as u16,
            base: VirtAddr::new(core::ptr::addr_of!(GDT) as u64),
        };
        lgdt(&pointer);

        CS::set_reg(SegmentSelector(selector::KERNEL_CODE));
        DS::set_reg(SegmentSelector(selector::KERNEL_DATA));
        ES::set_reg(SegmentSelector(selector::KERNEL_DATA));
        SS::set_reg(SegmentSelector(selector::KERNEL_DATA));

        load_tss(SegmentSelector(selector::TSS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_uses_the_canonical_descriptors() {
        let image = build(0);
        assert_eq!(image.null, SegmentDescriptor::null());
        assert_eq!(image.kernel_code, SegmentDescriptor::kernel_code64());
        assert_eq!(image.kernel_data, SegmentDescriptor::kernel_data());
        assert_eq!(image.user_code, SegmentDescriptor::user_code64());
        assert_eq!(image.user_data, SegmentDescriptor::user_data());
    }

    #[test]
    fn tss_descriptor_carries_patched_base() {
        let base = 0xFFFF_FFFF_8012_3450u64;
        let image = build(base);
        assert_eq!(image.tss.base(), base);
        assert_eq!(image.tss.limit() as usize, size_of::<TaskStateSegment>() - 1);
    }

    #[test]
    fn tss_slot_matches_its_selector() {
        assert_eq!(memoffset::offset_of!(GdtImage, tss) as u16, selector::TSS);
        assert_eq!(
            memoffset::offset_of!(GdtImage, kernel_code) as u16,
            selector::KERNEL_CODE
        );
    }
}
