//! GDT segment and TSS descriptor encoding.
//!
//! Descriptors are packed by hand; the bit layout is fixed by hardware and
//! never changes. Everything except loading the table registers is plain
//! arithmetic, so it lives here and gets unit tested.

use core::mem::size_of;

use static_assertions::const_assert_eq;

/// Selector values implied by the fixed descriptor order below.
pub mod selector {
    pub const KERNEL_CODE: u16 = 0x08;
    pub const KERNEL_DATA: u16 = 0x10;
    pub const USER_CODE: u16 = 0x18;
    pub const USER_DATA: u16 = 0x20;
    pub const TSS: u16 = 0x28;
}

// Access bytes: present, code/data, ring, type bits.
const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
/// System descriptor: present, type = available 64-bit TSS.
const ACCESS_TSS: u8 = 0x89;

// Flag nibbles: granularity plus the long (L) or default-size (D) bit.
const FLAGS_LONG_CODE: u8 = 0b1010;
const FLAGS_FLAT_32: u8 = 0b1100;
const FLAGS_FLAT_16: u8 = 0b1000;

const FLAT_LIMIT: u32 = 0xF_FFFF;

/// Packs base, limit, access and flags into the hardware's split layout.
const fn descriptor(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    assert!(limit <= 0xF_FFFF);

    (limit as u64 & 0xFFFF)
        | ((base as u64 & 0xFF_FFFF) << 16)
        | ((access as u64) << 40)
        | (((limit as u64 >> 16) & 0xF) << 48)
        | ((flags as u64 & 0xF) << 52)
        | (((base as u64 >> 24) & 0xFF) << 56)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(transparent)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    pub const fn null() -> SegmentDescriptor {
        SegmentDescriptor(0)
    }

    /// 64-bit ring 0 code. Base and limit are ignored in long mode but kept
    /// flat for form.
    pub const fn kernel_code64() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_KERNEL_CODE, FLAGS_LONG_CODE))
    }

    pub const fn kernel_data() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_KERNEL_DATA, FLAGS_FLAT_32))
    }

    pub const fn user_code64() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_USER_CODE, FLAGS_LONG_CODE))
    }

    pub const fn user_data() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_USER_DATA, FLAGS_FLAT_32))
    }

    /// 16-bit flat code with a 4 GiB limit. The loader's instruction stream
    /// is assembled for 16-bit decoding, so its protected-mode windows keep
    /// CS in a D=0 segment until the final 64-bit jump.
    pub const fn flat_code16() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_KERNEL_CODE, FLAGS_FLAT_16))
    }

    /// 32-bit flat data with a 4 GiB limit; loading this in protected mode
    /// is what leaves the flat limits cached for big real mode.
    pub const fn flat_data32() -> SegmentDescriptor {
        SegmentDescriptor(descriptor(0, FLAT_LIMIT, ACCESS_KERNEL_DATA, FLAGS_FLAT_32))
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn base(self) -> u32 {
        (((self.0 >> 16) & 0xFF_FFFF) | (((self.0 >> 56) & 0xFF) << 24)) as u32
    }

    pub fn limit(self) -> u32 {
        ((self.0 & 0xFFFF) | (((self.0 >> 48) & 0xF) << 16)) as u32
    }
}

/// 16-byte system descriptor for the TSS. The base is split across three
/// fields and only known at run time, so this is built, not a constant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct TssDescriptor {
    pub low: u64,
    pub high: u64,
}

impl TssDescriptor {
    pub const fn null() -> TssDescriptor {
        TssDescriptor { low: 0, high: 0 }
    }

    pub fn new(base: u64, limit: u32) -> TssDescriptor {
        assert!(limit <= 0xF_FFFF);

        let low = (limit as u64 & 0xFFFF)
            | ((base & 0xFF_FFFF) << 16)
            | ((ACCESS_TSS as u64) << 40)
            | (((limit as u64 >> 16) & 0xF) << 48)
            | (((base >> 24) & 0xFF) << 56);
        let high = base >> 32;

        TssDescriptor { low, high }
    }

    pub fn base(self) -> u64 {
        ((self.low >> 16) & 0xFF_FFFF) | (((self.low >> 56) & 0xFF) << 24) | (self.high << 32)
    }

    pub fn limit(self) -> u32 {
        ((self.low & 0xFFFF) | (((self.low >> 48) & 0xF) << 16)) as u32
    }
}

/// The 64-bit TSS. Only the stack pointers matter; there is no hardware task
/// switching.
#[derive(Clone, Copy, Debug)]
#[repr(C, packed(4))]
pub struct TaskStateSegment {
    reserved_1: u32,
    /// RSP for rings 0..2 on privilege-raising interrupts.
    pub privilege_stacks: [u64; 3],
    reserved_2: u64,
    /// IST stacks 1..7.
    pub interrupt_stacks: [u64; 7],
    reserved_3: u64,
    reserved_4: u16,
    /// Offset of the (absent) I/O permission bitmap; pointing it at the end
    /// of the segment disables it.
    pub iomap_base: u16,
}

impl TaskStateSegment {
    pub const fn new() -> TaskStateSegment {
        TaskStateSegment {
            reserved_1: 0,
            privilege_stacks: [0; 3],
            reserved_2: 0,
            interrupt_stacks: [0; 7],
            reserved_3: 0,
            reserved_4: 0,
            iomap_base: size_of::<TaskStateSegment>() as u16,
        }
    }
}

const_assert_eq!(size_of::<TaskStateSegment>(), 104);
const_assert_eq!(size_of::<TssDescriptor>(), 16);
