//! Interrupt descriptor table and the central trap dispatcher.
//!
//! All 256 vectors get a tiny generated stub (see `trap.s`) that normalizes
//! the stack and jumps to one trampoline; the trampoline saves registers and
//! calls `trap_dispatch` with the frame. Building the gate array from the
//! stub addresses is pure and tested; only `lidt` needs hardware.

use spin::Mutex;

use shared::interrupt::{
    exception_name, GateDescriptor, TrapFrame, GATE_KERNEL, VECTOR_COUNT,
};
use shared::segment::selector;

#[cfg(target_os = "none")]
core::arch::global_asm!(include_str!("trap.s"), options(att_syntax, raw));

#[cfg(target_os = "none")]
extern "C" {
    /// Filled by `trap.s`: the address of each vector's entry stub.
    static trap_vectors: [u64; VECTOR_COUNT];
}

// Loaded into the hardware by address. Never moved or dropped after init;
// the Mutex only guards the one-time fill.
static IDT: Mutex<[GateDescriptor; VECTOR_COUNT]> =
    Mutex::new([GateDescriptor::missing(); VECTOR_COUNT]);

/// Every vector gets a kernel-only interrupt gate through kernel code.
fn build_table(stubs: &[u64; VECTOR_COUNT]) -> [GateDescriptor; VECTOR_COUNT] {
    let mut table = [GateDescriptor::missing(); VECTOR_COUNT];
    for (gate, &stub) in table.iter_mut().zip(stubs.iter()) {
        *gate = GateDescriptor::new(stub, selector::KERNEL_CODE, GATE_KERNEL);
    }
    table
}

#[cfg(target_os = "none")]
pub fn init() {
    use x86_64::structures::DescriptorTablePointer;
    use x86_64::VirtAddr;

    let mut idt = IDT.lock();
    *idt = build_table(unsafe { &trap_vectors });

    let pointer = DescriptorTablePointer {
        limit: (core::mem::size_of_val(&*idt) - 1) as u16,
        base: VirtAddr::new(idt.as_ptr() as u64),
    };
    unsafe {
        x86_64::instructions::tables::lidt(&pointer);
    }
}

/// First IRQ vector after the PIC remap.
pub const IRQ_VECTOR_BASE: u64 = 32;
const IRQ_VECTOR_LAST: u64 = IRQ_VECTOR_BASE + 15;

/// Called by the trampoline for every vector. CPU exceptions are fatal for
/// now; remapped IRQs go to the PIC layer; anything else is noise.
#[no_mangle]
extern "C" fn trap_dispatch(frame: &mut TrapFrame) {
    match frame.vector {
        0..=31 => panic!(
            "CPU exception {} ({}): error={:#x} rip={:#x} rsp={:#x}",
            frame.vector,
            exception_name(frame.vector as u8),
            frame.error_code,
            frame.rip,
            frame.rsp,
        ),
        IRQ_VECTOR_BASE..=IRQ_VECTOR_LAST => {
            crate::pic::handle_irq((frame.vector - IRQ_VECTOR_BASE) as u8, frame);
        }
        _ => log::warn!("ignoring unexpected interrupt {}", frame.vector),
    }
}
