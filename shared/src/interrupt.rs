//! IDT gate encoding and the saved-register frame contract.
//!
//! The kernel's interrupt stubs all funnel through one trampoline that saves
//! the general registers in a fixed order. `TrapFrame` mirrors that stack
//! image exactly; layout tests pin it so the assembly and this struct cannot
//! drift apart silently.

pub const VECTOR_COUNT: usize = 256;

/// Present, DPL 0, 64-bit interrupt gate.
pub const GATE_KERNEL: u8 = 0x8E;

/// A 16-byte IDT entry with the handler address split three ways.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    ist: u8,
    attributes: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl GateDescriptor {
    pub const fn missing() -> GateDescriptor {
        GateDescriptor {
            offset_low: 0,
            selector: 0,
            ist: 0,
            attributes: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    pub fn new(handler: u64, selector: u16, attributes: u8) -> GateDescriptor {
        GateDescriptor {
            offset_low: handler as u16,
            selector,
            ist: 0,
            attributes,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }

    pub fn handler(self) -> u64 {
        self.offset_low as u64 | ((self.offset_mid as u64) << 16) | ((self.offset_high as u64) << 32)
    }

    pub fn is_present(self) -> bool {
        self.attributes & 0x80 != 0
    }

    pub fn selector(self) -> u16 {
        self.selector
    }

    pub fn attributes(self) -> u8 {
        self.attributes
    }
}

/// Vectors where the CPU pushes an error code before the return frame. The
/// stubs for every other vector push a zero so the frame shape is uniform.
pub fn pushes_error_code(vector: u8) -> bool {
    matches!(vector, 8 | 10..=14 | 17 | 30)
}

/// What the stack looks like when the trampoline calls into Rust: the
/// general registers it pushed, the vector and error code from the stub, and
/// the CPU's interrupt return frame.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "divide error",
        1 => "debug",
        2 => "non-maskable interrupt",
        3 => "breakpoint",
        4 => "overflow",
        5 => "bound range exceeded",
        6 => "invalid opcode",
        7 => "device not available",
        8 => "double fault",
        9 => "coprocessor segment overrun",
        10 => "invalid TSS",
        11 => "segment not present",
        12 => "stack-segment fault",
        13 => "general protection fault",
        14 => "page fault",
        16 => "x87 floating-point exception",
        17 => "alignment check",
        18 => "machine check",
        19 => "SIMD floating-point exception",
        20 => "virtualization exception",
        21 => "control protection exception",
        28 => "hypervisor injection exception",
        29 => "VMM communication exception",
        30 => "security exception",
        _ => "unknown exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use memoffset::offset_of;

    #[test]
    fn gate_round_trips_handler_address() {
        let gate = GateDescriptor::new(0xDEAD_BEEF_CAFE_F00D, 0x08, GATE_KERNEL);
        assert_eq!(gate.handler(), 0xDEAD_BEEF_CAFE_F00D);
        assert_eq!(gate.selector(), 0x08);
        assert_eq!(gate.attributes(), 0x8E);
        assert!(gate.is_present());
    }

    #[test]
    fn missing_gate_is_absent() {
        assert!(!GateDescriptor::missing().is_present());
        assert_eq!(GateDescriptor::missing().handler(), 0);
    }

    #[test]
    fn gate_is_16_bytes() {
        assert_eq!(core::mem::size_of::<GateDescriptor>(), 16);
        assert_eq!(offset_of!(GateDescriptor, offset_mid), 6);
        assert_eq!(offset_of!(GateDescriptor, offset_high), 8);
    }

    #[test]
    fn error_code_vectors_are_exactly_the_hardware_set() {
        let expected = [8u8, 10, 11, 12, 13, 14, 17, 30];
        for vector in 0..=255u8 {
            assert_eq!(
                pushes_error_code(vector),
                expected.contains(&vector),
                "vector {vector}"
            );
        }
    }

    // These offsets are what the trampoline's push sequence produces; if one
    // fails, the assembly and the struct disagree.
    #[test]
    fn trap_frame_matches_push_order() {
        assert_eq!(core::mem::size_of::<TrapFrame>(), 22 * 8);
        assert_eq!(offset_of!(TrapFrame, r15), 0);
        assert_eq!(offset_of!(TrapFrame, r8), 7 * 8);
        assert_eq!(offset_of!(TrapFrame, rdi), 8 * 8);
        assert_eq!(offset_of!(TrapFrame, rax), 14 * 8);
        assert_eq!(offset_of!(TrapFrame, vector), 15 * 8);
        assert_eq!(offset_of!(TrapFrame, error_code), 16 * 8);
        assert_eq!(offset_of!(TrapFrame, rip), 17 * 8);
        assert_eq!(offset_of!(TrapFrame, ss), 21 * 8);
    }

    #[test]
    fn exception_names_cover_the_architectural_set() {
        assert_eq!(exception_name(13), "general protection fault");
        assert_eq!(exception_name(14), "page fault");
        assert_eq!(exception_name(15), "unknown exception");
        assert_eq!(exception_name(200), "unknown exception");
    }
}
