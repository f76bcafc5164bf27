//! Pulling the disk image above 1 MiB.
//!
//! Firmware reads land in a low staging buffer, capped at 100 sectors per
//! call; each batch is then copied up through the flat-limit segments. The
//! batch arithmetic is pure and tested; the transfer itself is not.

#[cfg(any(target_os = "none", test))]
use shared::fat16::SECTOR_SIZE;

/// Transfer cap per firmware call, in sectors.
pub const SECTORS_PER_BATCH: u64 = 100;

/// First firmware disk number.
#[cfg(target_os = "none")]
const BOOT_DRIVE: u8 = 0x80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Batch {
    pub lba: u64,
    pub sectors: u16,
}

/// Splits a large read into staging-buffer-sized batches.
pub struct SectorBatches {
    next_lba: u64,
    remaining: u64,
}

impl SectorBatches {
    pub fn new(lba: u64, count: u64) -> SectorBatches {
        SectorBatches {
            next_lba: lba,
            remaining: count,
        }
    }
}

impl Iterator for SectorBatches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.remaining == 0 {
            return None;
        }

        let sectors = u64::min(self.remaining, SECTORS_PER_BATCH);
        let batch = Batch {
            lba: self.next_lba,
            sectors: sectors as u16,
        };

        self.next_lba += sectors;
        self.remaining -= sectors;
        Some(batch)
    }
}

/// Stages the whole disk window: read a batch low, copy it high, repeat.
#[cfg(target_os = "none")]
pub fn read_disk_image() -> Result<(), shared::error::BootError> {
    use shared::layout::LAYOUT;

    let sectors = LAYOUT.disk_window.length().as_raw() / SECTOR_SIZE as u64;
    read_sectors(0, sectors, LAYOUT.disk_window.address())
}

#[cfg(target_os = "none")]
pub fn read_sectors(
    lba: u64,
    count: u64,
    dest: shared::memory::PhysAddress,
) -> Result<(), shared::error::BootError> {
    use crate::bios::{self, DiskPacket};
    use shared::error::BootError;
    use shared::layout::LAYOUT;

    let staging = LAYOUT.disk_staging.address().as_raw() as u32;
    let mut high = dest.as_raw() as u32;

    // Firmware reads the packet through DS:SI with DS zeroed, which only
    // reaches the first 64 KiB; the stack is too high, so the packet goes
    // in its fixed layout slot.
    let packet_slot = LAYOUT.disk_packet.address().as_raw() as usize as *mut DiskPacket;

    for batch in SectorBatches::new(lba, count) {
        let packet = DiskPacket::new(
            batch.lba,
            batch.sectors,
            (staging >> 4) as u16,
            (staging & 0xF) as u16,
        );

        let ok = unsafe {
            packet_slot.write(packet);
            bios::disk_read(&*packet_slot, BOOT_DRIVE)
        };
        if !ok {
            return Err(BootError::DiskReadFailure);
        }

        let bytes = batch.sectors as u32 * SECTOR_SIZE as u32;
        unsafe { copy_high(staging, high, bytes / 2) };
        high += bytes;
    }

    Ok(())
}

/// Word-wise copy using 32-bit addressing. Valid only while the flat
/// segment limits from the big real switch are cached.
#[cfg(target_os = "none")]
unsafe fn copy_high(src: u32, dst: u32, words: u32) {
    unsafe {
        core::arch::asm!(
            "rep movsw",
            inout("esi") src => _,
            inout("edi") dst => _,
            inout("ecx") words => _,
            options(nostack),
        );
    }
}
