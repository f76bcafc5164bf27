//! Physical memory map bookkeeping.
//!
//! The loader fills a `Map` from the firmware's region reports, picks a load
//! region with `select_load_region`, and hands the whole map to the kernel.
//! `Map` is `repr(C)` with fixed capacity so it crosses the loader/kernel
//! boundary as plain bytes.

pub mod addr;

pub use addr::*;

use crate::error::BootError;

pub const MAX_REGIONS: usize = 128;

/// One raw record as the firmware query writes it: 64-bit base and length, a
/// 32-bit type code, and the extended attribute word. 24 bytes.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct RawRegion {
    pub base: u64,
    pub length: u64,
    pub region_type: u32,
    pub acpi_attr: u32,
}

impl RawRegion {
    pub const fn empty() -> RawRegion {
        RawRegion {
            base: 0,
            length: 0,
            region_type: 0,
            // Bit 0 set means the record is valid; firmware that does not
            // write the attribute word leaves whatever we preset here.
            acpi_attr: 1,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
#[repr(u64)]
pub enum MemoryType {
    /// Available for our use.
    Available,
    /// Reserved, unusable.
    Reserved,
    /// ACPI tables; reclaimable once they are parsed.
    AcpiReclaimable,
    /// Must be saved and restored across hibernation.
    ReservedPreserveOnHibernation,
    /// Reported defective.
    Defective,
}

impl MemoryType {
    /// Unknown codes are treated as reserved.
    pub fn from_raw(code: u32) -> MemoryType {
        match code {
            1 => MemoryType::Available,
            3 => MemoryType::AcpiReclaimable,
            4 => MemoryType::ReservedPreserveOnHibernation,
            5 => MemoryType::Defective,
            _ => MemoryType::Reserved,
        }
    }
}

#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct MapEntry {
    pub extent: PhysExtent,
    pub mem_type: MemoryType,
}

/// Memory map in the order the firmware reported it. No sorting, merging, or
/// overlap resolution is done; entries keep their report order.
#[derive(Clone, Debug)]
#[repr(C)]
pub struct Map {
    entries: [MapEntry; MAX_REGIONS],
    num_entries: u64,
}

impl Map {
    pub fn from_entries(entries: impl IntoIterator<Item = MapEntry>) -> Map {
        let dummy = MapEntry {
            extent: PhysExtent::from_raw(0, 1),
            mem_type: MemoryType::Reserved,
        };

        let mut map = Map {
            entries: [dummy; MAX_REGIONS],
            num_entries: 0,
        };

        for entry in entries {
            map.entries[map.num_entries as usize] = entry;
            map.num_entries += 1;
        }

        map
    }

    /// Converts raw firmware records. Zero-length records cannot form an
    /// extent and are dropped here, so selection never has to special-case
    /// them.
    pub fn from_raw_regions(regions: impl IntoIterator<Item = RawRegion>) -> Map {
        Map::from_entries(regions.into_iter().filter_map(|region| {
            let extent = PhysExtent::new_checked(
                PhysAddress::from_raw(region.base),
                Length::from_raw(region.length),
            )?;
            Some(MapEntry {
                extent,
                mem_type: MemoryType::from_raw(region.region_type),
            })
        }))
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries[0..self.num_entries as usize]
    }

    pub fn iter_type(&self, mem_type: MemoryType) -> impl Iterator<Item = &MapEntry> {
        self.entries().iter().filter(move |e| e.mem_type == mem_type)
    }
}

/// Picks the region the kernel image is loaded into.
///
/// The first available entry that begins at or below `min_base` and reaches
/// at least `min_base + min_size` wins. The region's end must stay
/// addressable with 32 bits since the loader copies into it before paging is
/// on.
pub fn select_load_region(
    map: &Map,
    min_base: PhysAddress,
    min_size: Length,
) -> Result<PhysExtent, BootError> {
    let min_end = min_base.offset_by(min_size);

    for entry in map.iter_type(MemoryType::Available) {
        let extent = entry.extent;
        if extent.address() <= min_base
            && extent.end_address() >= min_end
            && extent.end_address().as_raw() <= 1 << 32
        {
            return Ok(extent);
        }
    }

    Err(BootError::NoSuitableMemory)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::vec::Vec;

    fn raw(base: u64, length: u64, region_type: u32) -> RawRegion {
        RawRegion {
            base,
            length,
            region_type,
            acpi_attr: 1,
        }
    }

    /// The map a small virtual machine typically reports.
    fn typical_regions() -> Vec<RawRegion> {
        std::vec![
            raw(0x0, 0x9FC00, 1),
            raw(0x9FC00, 0x400, 2),
            raw(0xF0000, 0x10000, 2),
            raw(0xFFFC0000, 0x40000, 2),
            raw(0x100000, 0x8000000, 1),
            raw(0x8100000, 0x1000, 3),
        ]
    }

    #[test]
    fn conversion_keeps_report_order() {
        let map = Map::from_raw_regions(typical_regions());
        assert_eq!(map.entries().len(), 6);
        assert_eq!(map.entries()[0].mem_type, MemoryType::Available);
        assert_eq!(map.entries()[1].mem_type, MemoryType::Reserved);
        assert_eq!(map.entries()[4].extent, PhysExtent::from_raw(0x100000, 0x8000000));
        assert_eq!(map.entries()[5].mem_type, MemoryType::AcpiReclaimable);
    }

    #[test]
    fn conversion_drops_zero_length_records() {
        let mut regions = typical_regions();
        regions.insert(2, raw(0x500000, 0, 1));
        let map = Map::from_raw_regions(regions);
        assert_eq!(map.entries().len(), 6);
        assert!(map
            .entries()
            .iter()
            .all(|e| e.extent.length().as_raw() != 0));
    }

    #[test]
    fn unknown_type_codes_are_reserved() {
        assert_eq!(MemoryType::from_raw(0), MemoryType::Reserved);
        assert_eq!(MemoryType::from_raw(6), MemoryType::Reserved);
        assert_eq!(MemoryType::from_raw(0xFFFF), MemoryType::Reserved);
    }

    #[test]
    fn iter_type_filters() {
        let map = Map::from_raw_regions(typical_regions());
        assert_eq!(map.iter_type(MemoryType::Available).count(), 2);
        assert_eq!(map.iter_type(MemoryType::Reserved).count(), 3);
    }

    #[test_log::test]
    fn selects_region_covering_kernel_window() {
        let map = Map::from_raw_regions(typical_regions());
        let selected = select_load_region(
            &map,
            PhysAddress::from_raw(0x100000),
            Length::from_raw(0x6400000),
        )
        .unwrap();
        assert_eq!(selected, PhysExtent::from_raw(0x100000, 0x8000000));
    }

    #[test]
    fn skips_too_small_available_regions() {
        // Entry 0 starts low enough but only reaches 0x9FC00; entry 4 is
        // large enough but does not start at or below the requested base.
        let map = Map::from_raw_regions(typical_regions());
        let err = select_load_region(
            &map,
            PhysAddress::from_raw(0x1000),
            Length::from_raw(0x100000),
        )
        .unwrap_err();
        assert_eq!(err, BootError::NoSuitableMemory);
    }

    #[test]
    fn fails_when_nothing_fits() {
        let map = Map::from_raw_regions(typical_regions());
        let err = select_load_region(
            &map,
            PhysAddress::from_raw(0x100000),
            Length::from_raw(0x10000000),
        )
        .unwrap_err();
        assert_eq!(err, BootError::NoSuitableMemory);
    }

    #[test]
    fn reserved_regions_never_selected() {
        let map = Map::from_raw_regions(std::vec![raw(0x100000, 0x8000000, 2)]);
        assert!(select_load_region(
            &map,
            PhysAddress::from_raw(0x100000),
            Length::from_raw(0x1000),
        )
        .is_err());
    }

    #[test]
    fn region_must_stay_32_bit_reachable() {
        // Plenty large, but it ends above 4 GiB.
        let map = Map::from_raw_regions(std::vec![raw(0x100000, 0x2_0000_0000, 1)]);
        assert!(select_load_region(
            &map,
            PhysAddress::from_raw(0x100000),
            Length::from_raw(0x1000),
        )
        .is_err());

        // Ending exactly at 4 GiB is fine.
        let map = Map::from_raw_regions(std::vec![raw(0x100000, 0x1_0000_0000 - 0x100000, 1)]);
        assert!(select_load_region(
            &map,
            PhysAddress::from_raw(0x100000),
            Length::from_raw(0x1000),
        )
        .is_ok());
    }

    #[test]
    fn raw_record_is_24_bytes() {
        assert_eq!(core::mem::size_of::<RawRegion>(), 24);
        assert_eq!(memoffset::offset_of!(RawRegion, length), 8);
        assert_eq!(memoffset::offset_of!(RawRegion, region_type), 16);
        assert_eq!(memoffset::offset_of!(RawRegion, acpi_attr), 20);
    }
}
