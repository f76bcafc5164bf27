//! Physical memory survey through the firmware's region walk.

#[cfg(target_os = "none")]
use shared::error::BootError;
#[cfg(target_os = "none")]
use shared::layout::LAYOUT;
#[cfg(target_os = "none")]
use shared::memory::{Map, RawRegion, MAX_REGIONS};

/// Walks the firmware map into the layout's raw buffer, then converts it.
/// The walk stops when the continuation token comes back zero, the call
/// fails, or the buffer is full. Failing on the very first record means no
/// map at all, which is fatal.
#[cfg(target_os = "none")]
pub fn survey() -> Result<Map, BootError> {
    let buffer = LAYOUT.mem_map_buffer.address().as_raw() as usize as *mut RawRegion;

    let mut count = 0usize;
    let mut token = 0u32;

    while count < MAX_REGIONS {
        // Preset the record so firmware that skips the attribute word still
        // leaves it valid.
        let dest = unsafe {
            buffer.add(count).write(RawRegion::empty());
            &mut *buffer.add(count)
        };

        token = match unsafe { crate::bios::mem_map_next(token, dest) } {
            Some(next) => next,
            None if count == 0 => return Err(BootError::MemoryMapFailure),
            None => break,
        };

        count += 1;

        if token == 0 {
            break;
        }
    }

    let regions = unsafe { core::slice::from_raw_parts(buffer as *const RawRegion, count) };
    Ok(Map::from_raw_regions(regions.iter().copied()))
}
