//! Execution-mode transitions, strictly forward.
//!
//! The loader passes through five stages: real mode, a protected-mode probe
//! whose only job is caching flat segment limits, big real mode for the
//! high copies, protected mode again, and finally long mode. There is no
//! way back; each transition function documents what it assumes and what
//! holds afterwards.
//!
//! Two disciplines hold across every transition. Interrupts: each switch
//! into protected mode starts with `cli` (the real-mode vector table is the
//! only one installed, and it is useless once PE is set); only the drop
//! back to big real mode re-enables them, so the kernel is entered with
//! IF clear. Decoding: the crate is assembled for 16-bit decoding (see the
//! loader target), so CS stays a D=0 segment through every protected-mode
//! window and only the final far jump leaves it.

#[cfg(target_os = "none")]
use shared::handoff::BootInfo;
#[cfg(target_os = "none")]
use shared::memory::{PhysAddress, VirtAddress};
#[cfg(target_os = "none")]
use shared::segment::SegmentDescriptor;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Real,
    ProtectedProbe,
    BigReal,
    ProtectedFinal,
    Long,
}

impl Stage {
    /// The only stage reachable from `self`.
    pub fn successor(self) -> Option<Stage> {
        match self {
            Stage::Real => Some(Stage::ProtectedProbe),
            Stage::ProtectedProbe => Some(Stage::BigReal),
            Stage::BigReal => Some(Stage::ProtectedFinal),
            Stage::ProtectedFinal => Some(Stage::Long),
            Stage::Long => None,
        }
    }
}

#[cfg(target_os = "none")]
mod hw {
    use super::*;

    const CR0_PE: u32 = 1;
    const CR0_PG: u32 = 1 << 31;
    const CR4_PAE: u32 = 1 << 5;
    const CR4_PGE: u32 = 1 << 7;
    const EFER_MSR: u32 = 0xC000_0080;
    const EFER_LME: u32 = 1 << 8;

    /// Selectors into `LOADER_GDT` below.
    const CODE16: u16 = 0x08;
    const DATA32: u16 = 0x10;
    const CODE64: u16 = 0x18;

    /// The loader's own GDT. The code descriptor is 16-bit (D=0): the crate
    /// is assembled for 16-bit decoding, so CS must stay a D=0 segment
    /// through every protected-mode window until the final 64-bit jump.
    static LOADER_GDT: [SegmentDescriptor; 4] = [
        SegmentDescriptor::null(),
        SegmentDescriptor::flat_code16(),
        SegmentDescriptor::flat_data32(),
        SegmentDescriptor::kernel_code64(),
    ];

    /// Handoff values the 64-bit tail of `enter_long` loads from memory;
    /// the registers available before the final jump are 32 bits wide and
    /// cannot carry the high-half entry address.
    #[repr(C)]
    struct JumpParams {
        entry: u64,
        stack_top: u64,
        boot_info: u64,
    }

    static mut JUMP_PARAMS: JumpParams = JumpParams {
        entry: 0,
        stack_top: 0,
        boot_info: 0,
    };

    #[repr(C, packed)]
    struct GdtPointer {
        limit: u16,
        base: u64,
    }

    unsafe fn load_gdt() {
        let pointer = GdtPointer {
            limit: (core::mem::size_of_val(&LOADER_GDT) - 1) as u16,
            base: LOADER_GDT.as_ptr() as u64,
        };
        unsafe {
            core::arch::asm!("lgdtl ({ptr})", ptr = in(reg) &pointer, options(att_syntax, nostack));
        }
    }

    /// Real mode -> protected mode with a 16-bit code segment and flat
    /// data segments.
    ///
    /// Assumes: real mode.
    /// Afterwards: CR0.PE set, interrupts disabled, CS flat 16-bit,
    /// DS/ES/SS flat with 4 GiB limits.
    pub unsafe fn enter_protected() {
        unsafe {
            load_gdt();
            core::arch::asm!(
                // The real-mode vector table is meaningless once PE is set.
                "cli",
                "movl %cr0, %eax",
                "orl ${pe}, %eax",
                "movl %eax, %cr0",
                // Serialize and load protected CS. The 16-bit descriptor
                // keeps the instruction stream decoding correctly.
                "ljmpl ${code16}, $2f",
                "2:",
                "movw ${data32}, %ax",
                "movw %ax, %ds",
                "movw %ax, %es",
                "movw %ax, %ss",
                pe = const CR0_PE,
                code16 = const CODE16,
                data32 = const DATA32,
                out("eax") _,
                options(att_syntax),
            );
        }
    }

    /// Protected mode -> big real mode.
    ///
    /// Assumes: `enter_protected` ran, so every segment register carries a
    /// cached 4 GiB limit.
    /// Afterwards: CR0.PE clear, real-mode segments reloaded with zero
    /// bases, but the flat limits stay cached; interrupts re-enabled so
    /// firmware services work again.
    pub unsafe fn drop_to_real() {
        unsafe {
            core::arch::asm!(
                "movl %cr0, %eax",
                "andl $~{pe}, %eax",
                "movl %eax, %cr0",
                "ljmpl $0, $2f",
                "2:",
                "xorw %ax, %ax",
                "movw %ax, %ds",
                "movw %ax, %es",
                "movw %ax, %ss",
                // Firmware calls need the real-mode vector table live.
                "sti",
                pe = const CR0_PE,
                out("eax") _,
                options(att_syntax),
            );
        }
    }

    /// Big real mode -> long mode, never returns.
    ///
    /// Assumes: page tables installed at `pml4`, the kernel image in place,
    /// the handoff structure written.
    /// Afterwards (in the kernel): 64-bit mode, paging on, RSP = stack_top,
    /// RDI = boot_info, interrupts disabled.
    pub unsafe fn enter_long(
        pml4: PhysAddress,
        entry: VirtAddress,
        stack_top: VirtAddress,
        boot_info: *const BootInfo,
    ) -> ! {
        unsafe {
            let params = core::ptr::addr_of_mut!(JUMP_PARAMS);
            (*params).entry = entry.as_raw();
            (*params).stack_top = stack_top.as_raw();
            (*params).boot_info = boot_info as usize as u64;

            load_gdt();
            core::arch::asm!(
                // No interrupt may fire between here and the kernel's own
                // IDT load.
                "cli",
                // Protected mode again; CS stays 16-bit until long mode.
                "movl %cr0, %eax",
                "orl ${pe}, %eax",
                "movl %eax, %cr0",
                "ljmpl ${code16}, $2f",
                "2:",
                "movw ${data32}, %ax",
                "movw %ax, %ds",
                "movw %ax, %es",
                "movw %ax, %ss",
                // PAE and global pages on, root table in CR3.
                "movl %cr4, %eax",
                "orl ${cr4_bits}, %eax",
                "movl %eax, %cr4",
                "movl %edi, %cr3",
                // Long mode enable in EFER.
                "movl ${efer}, %ecx",
                "rdmsr",
                "orl ${lme}, %eax",
                "wrmsr",
                // Paging on activates long mode; jump into 64-bit code.
                "movl %cr0, %eax",
                "orl ${pg}, %eax",
                "movl %eax, %cr0",
                "ljmpl ${code64}, $3f",
                ".code64",
                "3:",
                "movq {params}+8(%rip), %rsp",
                "movq {params}+16(%rip), %rdi",
                "movq {params}(%rip), %rax",
                "jmpq *%rax",
                pe = const CR0_PE,
                pg = const CR0_PG,
                cr4_bits = const CR4_PAE | CR4_PGE,
                efer = const EFER_MSR,
                lme = const EFER_LME,
                code16 = const CODE16,
                data32 = const DATA32,
                code64 = const CODE64,
                params = sym JUMP_PARAMS,
                inout("edi") pml4.as_raw() as u32 => _,
                out("eax") _,
                out("ecx") _,
                out("edx") _,
                options(att_syntax, noreturn),
            );
        }
    }
}

#[cfg(target_os = "none")]
pub unsafe fn enter_protected_probe() {
    unsafe { hw::enter_protected() }
}

#[cfg(target_os = "none")]
pub unsafe fn drop_to_big_real() {
    unsafe { hw::drop_to_real() }
}

#[cfg(target_os = "none")]
pub unsafe fn enter_protected_final() {
    unsafe { hw::enter_protected() }
}

#[cfg(target_os = "none")]
pub unsafe fn enter_long_mode(
    pml4: shared::memory::PhysAddress,
    entry: shared::memory::VirtAddress,
    stack_top: shared::memory::VirtAddress,
    boot_info: *const shared::handoff::BootInfo,
) -> ! {
    unsafe { hw::enter_long(pml4, entry, stack_top, boot_info) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_forward_only() {
        let mut stage = Stage::Real;
        let expected = [
            Stage::ProtectedProbe,
            Stage::BigReal,
            Stage::ProtectedFinal,
            Stage::Long,
        ];
        for next in expected {
            stage = stage.successor().unwrap();
            assert_eq!(stage, next);
        }
        assert_eq!(stage.successor(), None);
    }
}
