//! The firmware call surface: extended disk reads, the memory-map query,
//! and teletype output.
//!
//! Everything here must run below 1 MiB with real-mode interrupts working.
//! The packet and record layouts are fixed by firmware; tests pin them.

use core::mem::size_of;

use static_assertions::const_assert_eq;

#[cfg(target_os = "none")]
use shared::memory::RawRegion;

/// The extended-read request packet: 16 bytes, passed by pointer in DS:SI.
#[derive(Clone, Copy, Debug)]
#[repr(C, packed)]
pub struct DiskPacket {
    /// Always `size_of::<DiskPacket>()`.
    packet_size: u8,
    reserved: u8,
    /// Sectors to transfer; firmware caps this low, so callers batch.
    pub sectors: u16,
    /// Destination, segment:offset.
    pub dest_offset: u16,
    pub dest_segment: u16,
    /// Absolute sector to start at.
    pub lba: u64,
}

const_assert_eq!(size_of::<DiskPacket>(), 16);

impl DiskPacket {
    pub fn new(lba: u64, sectors: u16, dest_segment: u16, dest_offset: u16) -> DiskPacket {
        DiskPacket {
            packet_size: size_of::<DiskPacket>() as u8,
            reserved: 0,
            sectors,
            dest_offset,
            dest_segment,
            lba,
        }
    }
}

/// INT 13h AH=42h: read `packet.sectors` sectors to the packet's
/// destination. True on success (carry clear).
///
/// # Safety
///
/// Real-mode firmware call; the destination must be scratch memory.
#[cfg(target_os = "none")]
pub unsafe fn disk_read(packet: &DiskPacket, drive: u8) -> bool {
    let carry: u8;
    unsafe {
        core::arch::asm!(
            "int 0x13",
            "setc {carry}",
            inout("ax") 0x4200u16 => _,
            in("dx") drive as u16,
            in("si") packet as *const DiskPacket as usize as u16,
            carry = out(reg_byte) carry,
        );
    }
    carry == 0
}

/// Magic tag for the memory-map query: "SMAP".
#[cfg(target_os = "none")]
const MEM_MAP_MAGIC: u32 = 0x534D_4150;

/// INT 15h EAX=E820h: writes one record to `dest` and returns the
/// continuation token for the next call. Zero means the walk is complete;
/// `None` means the call failed.
///
/// # Safety
///
/// Real-mode firmware call.
#[cfg(target_os = "none")]
pub unsafe fn mem_map_next(token: u32, dest: &mut RawRegion) -> Option<u32> {
    let next: u32;
    let tag: u32;
    let carry: u8;
    unsafe {
        // The continuation token travels in EBX, which LLVM reserves; park
        // the real EBX in ESI around the call.
        core::arch::asm!(
            "mov esi, ebx",
            "mov ebx, {token:e}",
            "int 0x15",
            "setc {carry}",
            "mov {token:e}, ebx",
            "mov ebx, esi",
            token = inout(reg) token => next,
            inout("eax") 0xE820u32 => tag,
            in("ecx") size_of::<RawRegion>() as u32,
            in("edx") MEM_MAP_MAGIC,
            in("di") dest as *mut RawRegion as usize as u16,
            carry = out(reg_byte) carry,
            out("esi") _,
        );
    }

    if carry != 0 || tag != MEM_MAP_MAGIC {
        return None;
    }
    Some(next)
}

/// INT 10h AH=0Eh: write one character to the screen.
#[cfg(target_os = "none")]
unsafe fn teletype(byte: u8) {
    unsafe {
        // BL carries page 0 and the default attribute; EBX is reserved by
        // LLVM, so set it up manually.
        core::arch::asm!(
            "mov esi, ebx",
            "xor ebx, ebx",
            "int 0x10",
            "mov ebx, esi",
            inout("ax") 0x0E00u16 | byte as u16 => _,
            out("esi") _,
        );
    }
}

/// `core::fmt::Write` over the teletype call, for the boot logger.
pub struct TeletypeWriter(());

impl TeletypeWriter {
    pub fn new() -> TeletypeWriter {
        TeletypeWriter(())
    }
}

#[cfg(target_os = "none")]
impl core::fmt::Write for TeletypeWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            // Firmware wants explicit carriage returns.
            if byte == b'\n' {
                unsafe { teletype(b'\r') };
            }
            unsafe { teletype(byte) };
        }
        Ok(())
    }
}
