//! The structure the loader leaves for the kernel.

use crate::memory::{Map, PhysExtent, VirtAddress};

/// Written by the loader at `layout::LAYOUT.handoff`; the kernel receives a
/// pointer to it in its first argument register. `repr(C)` throughout since
/// it crosses a binary boundary as raw memory.
///
/// Contract at the jump: long mode with paging on, interrupts disabled, the
/// stack already switched to `stack_top`.
#[derive(Clone)]
#[repr(C)]
pub struct BootInfo {
    /// The firmware memory map, in report order.
    pub mem_map: Map,
    /// The physical region the kernel image and stack were placed in.
    pub kernel_region: PhysExtent,
    /// Initial stack top, inside `kernel_region`.
    pub stack_top: VirtAddress,
}
