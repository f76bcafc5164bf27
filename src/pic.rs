//! 8259 PIC setup and IRQ routing.
//!
//! IRQs arrive through the central trap dispatcher at vectors 32..48. This
//! module remaps the controllers there, filters spurious IRQs, runs the
//! registered handler, and acknowledges the controller.

use spin::Mutex;
use x86_64::instructions::interrupts::without_interrupts;
use x86_64::instructions::port::*;

use shared::interrupt::TrapFrame;

pub type IrqHandlerFunc = fn(frame: &TrapFrame);

/// The number of IRQ lines per controller.
const IRQS_PER_PIC: u8 = 8;

const PIC_COMMAND_READ_ISR: u8 = 0x0B;
const PIC_COMMAND_ACKNOWLEDGE_IRQ: u8 = 0x20;

struct PicRegs {
    cmd_1: Port<u8>,
    cmd_2: Port<u8>,
    data_1: Port<u8>,
    data_2: Port<u8>,
}

static PIC_REGS: Mutex<PicRegs> = Mutex::new(PicRegs {
    // Commands go to each PIC's command port, e.g. init or acknowledge.
    // After an OCW3 the command port also reads back the selected register.
    cmd_1: Port::new(0x20),
    cmd_2: Port::new(0xA0),
    // When no command sequence is active, the data port reads/writes the
    // IRQ mask: bit N set means IRQ N (or N+8 for PIC 2) is suppressed.
    data_1: Port::new(0x21),
    data_2: Port::new(0xA1),
});

static IRQ_HANDLERS: Mutex<[Option<IrqHandlerFunc>; 16]> = Mutex::new([None; 16]);

/// Remaps both controllers over the exception vectors and masks every line.
/// Lines are opened one by one as handlers are installed.
///
/// # Safety
///
/// Interrupts must be disabled by the caller; enabling them afterwards is
/// fine.
#[cfg(target_os = "none")]
pub unsafe fn init() {
    without_interrupts(|| {
        let mut pic_regs = PIC_REGS.lock();

        unsafe {
            // Init sequence: edge-triggered, cascade, ICW4 needed.
            pic_regs.cmd_1.write(0x11);
            pic_regs.cmd_2.write(0x11);
            // New vector offsets.
            pic_regs.data_1.write(crate::idt::IRQ_VECTOR_BASE as u8);
            pic_regs
                .data_2
                .write(crate::idt::IRQ_VECTOR_BASE as u8 + IRQS_PER_PIC);
            // Cascade wiring: secondary on line 2.
            pic_regs.data_1.write(4);
            pic_regs.data_2.write(2);
            // 8086 mode.
            pic_regs.data_1.write(1);
            pic_regs.data_2.write(1);

            // Mask everything.
            pic_regs.data_1.write(0b1111_1111);
            pic_regs.data_2.write(0b1111_1111);
        }
    });
}

/// Installs or removes the handler for `irq_num` and opens or masks its
/// line to match.
pub fn install_irq_handler(irq_num: u8, maybe_handler: Option<IrqHandlerFunc>) {
    assert!(irq_num < IRQS_PER_PIC * 2);

    without_interrupts(|| {
        {
            let mut handlers = IRQ_HANDLERS.lock();
            if let Some(handler) = maybe_handler {
                assert!(handlers[irq_num as usize].is_none());
                handlers[irq_num as usize] = Some(handler);
            } else {
                handlers[irq_num as usize] = None;
            }
        }

        let should_mask = maybe_handler.is_none();
        let irq_chip = if irq_num < IRQS_PER_PIC { 0 } else { 1 };
        let irq_line = irq_num - IRQS_PER_PIC * irq_chip;

        let mut pic_regs = PIC_REGS.lock();
        if irq_chip == 0 {
            unsafe {
                set_mask(&mut pic_regs.data_1, irq_line, should_mask);
            }
        } else {
            unsafe {
                set_mask(&mut pic_regs.data_2, irq_line, should_mask);
            }
        }
    });
}

unsafe fn set_mask(data_port: &mut Port<u8>, irq_line: u8, set: bool) {
    unsafe {
        let old_mask = data_port.read();
        let new_mask = if set {
            old_mask | (1 << irq_line)
        } else {
            old_mask & !(1 << irq_line)
        };

        data_port.write(new_mask);
    }
}

/// A line-7 interrupt is real only if the controller reports it in
/// service; a clear ISR bit 7 means the controller faked the vector.
fn spurious_from_isr(isr: u8) -> bool {
    isr & 0b1000_0000 == 0
}

/// Only IRQs 7 and 15 can be spurious; a spurious one is not in service
/// when the controller is asked.
fn is_spurious(irq_num: u8) -> bool {
    if irq_num != 7 && irq_num != 15 {
        return false;
    }

    let mut pic_regs = PIC_REGS.lock();
    // OCW3 selects the ISR; the same command port reads it back.
    let isr = if irq_num == 7 {
        unsafe {
            pic_regs.cmd_1.write(PIC_COMMAND_READ_ISR);
            pic_regs.cmd_1.read()
        }
    } else {
        unsafe {
            pic_regs.cmd_2.write(PIC_COMMAND_READ_ISR);
            pic_regs.cmd_2.read()
        }
    };

    let spurious = spurious_from_isr(isr);

    // A spurious IRQ gets no EOI at the PIC that faked it, but a spurious
    // IRQ 15 still passed through the primary's cascade line, which does
    // need one.
    if spurious && irq_num == 15 {
        unsafe {
            pic_regs.cmd_1.write(PIC_COMMAND_ACKNOWLEDGE_IRQ);
        }
    }

    spurious
}

fn acknowledge_irq(irq_num: u8) {
    let mut pic_regs = PIC_REGS.lock();

    unsafe {
        if irq_num >= IRQS_PER_PIC {
            pic_regs.cmd_2.write(PIC_COMMAND_ACKNOWLEDGE_IRQ);
        }

        pic_regs.cmd_1.write(PIC_COMMAND_ACKNOWLEDGE_IRQ);
    }
}

/// Entry from the trap dispatcher. Interrupts are already off; the gate
/// disabled them.
pub fn handle_irq(irq_num: u8, frame: &TrapFrame) {
    assert!(irq_num < IRQS_PER_PIC * 2);

    if is_spurious(irq_num) {
        return;
    }

    {
        let handlers = IRQ_HANDLERS.lock();
        if let Some(handler) = handlers[irq_num as usize] {
            handler(frame);
        } else {
            // Masked lines shouldn't fire; a handler-less IRQ means the
            // mask bookkeeping broke.
            panic!("unhandled IRQ {irq_num} received");
        }
    }

    acknowledge_irq(irq_num);
}
