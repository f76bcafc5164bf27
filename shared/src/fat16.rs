//! Read-only FAT16 access, just enough to pull one file off the boot
//! partition.
//!
//! The volume is a borrowed byte slice; the caller decides where those bytes
//! came from. Directory entries outside the root directory, long file names,
//! and anything involving writes are out of scope.

pub const SECTOR_SIZE: usize = 512;
pub const DIR_ENTRY_SIZE: usize = 32;

const BOOT_SIGNATURE: u16 = 0xAA55;
const BOOT_SIGNATURE_OFFSET: usize = 0x1FE;

/// First byte of a never-used directory entry.
const ENTRY_EMPTY: u8 = 0x00;
/// First byte of a deleted directory entry.
const ENTRY_DELETED: u8 = 0xE5;
/// Attribute combination marking a long-file-name fragment.
const ATTR_LONG_NAME: u8 = 0x0F;

/// FAT value marking an unreadable cluster.
const BAD_CLUSTER: u16 = 0xFFF7;
/// FAT values at or above this end the chain.
const END_OF_CHAIN: u16 = 0xFFF8;
/// Data clusters are numbered starting at 2.
const FIRST_DATA_CLUSTER: u16 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fat16Error {
    /// The volume does not carry the boot sector signature.
    InvalidSignature,
    /// A cluster chain refers to a cluster marked bad.
    BadCluster,
}

/// BIOS parameter block fields the reader needs, pulled from their fixed
/// offsets in the first sector.
#[derive(Clone, Copy, Debug)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub sectors_per_fat: u16,
}

impl Bpb {
    /// Only valid after the signature check; garbage bytes parse to garbage
    /// fields.
    fn parse(volume: &[u8]) -> Bpb {
        Bpb {
            bytes_per_sector: u16_at(volume, 11),
            sectors_per_cluster: volume[13],
            reserved_sectors: u16_at(volume, 14),
            fat_count: volume[16],
            root_entries: u16_at(volume, 17),
            sectors_per_fat: u16_at(volume, 22),
        }
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * self.bytes_per_sector as usize
    }

    fn fat_offset(&self) -> usize {
        self.reserved_sectors as usize * self.bytes_per_sector as usize
    }

    fn root_dir_offset(&self) -> usize {
        self.fat_offset()
            + self.fat_count as usize * self.sectors_per_fat as usize * self.bytes_per_sector as usize
    }

    fn data_offset(&self) -> usize {
        self.root_dir_offset() + self.root_entries as usize * DIR_ENTRY_SIZE
    }
}

/// A root directory entry.
#[derive(Clone, Copy, Debug)]
pub struct DirEntry {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub attributes: u8,
    pub first_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    fn parse(bytes: &[u8]) -> DirEntry {
        let mut name = [0u8; 8];
        let mut ext = [0u8; 3];
        name.copy_from_slice(&bytes[0..8]);
        ext.copy_from_slice(&bytes[8..11]);
        DirEntry {
            name,
            ext,
            attributes: bytes[11],
            first_cluster: u16_at(bytes, 26),
            size: u32_at(bytes, 28),
        }
    }
}

/// Splits a bare 8.3 name into its padded directory-entry form. Paths with
/// separators or over-wide components have no root entry and yield `None`.
pub fn split_path(path: &str) -> Option<([u8; 8], [u8; 3])> {
    let (stem, extension) = match path.split_once('.') {
        Some((stem, extension)) => (stem, extension),
        None => (path, ""),
    };

    if stem.len() > 8 || extension.len() > 3 {
        return None;
    }

    let reject = |c: char| c == '/' || c == '\\' || c == '.';
    if stem.contains(reject) || extension.contains(reject) {
        return None;
    }

    let mut name = [b' '; 8];
    let mut ext = [b' '; 3];
    name[..stem.len()].copy_from_slice(stem.as_bytes());
    ext[..extension.len()].copy_from_slice(extension.as_bytes());
    Some((name, ext))
}

#[derive(Debug)]
pub struct Volume<'a> {
    bytes: &'a [u8],
    bpb: Bpb,
}

impl<'a> Volume<'a> {
    /// Checks the boot sector signature, then trusts the parameter block.
    pub fn open(bytes: &'a [u8]) -> Result<Volume<'a>, Fat16Error> {
        if bytes.len() < SECTOR_SIZE
            || u16_at(bytes, BOOT_SIGNATURE_OFFSET) != BOOT_SIGNATURE
        {
            return Err(Fat16Error::InvalidSignature);
        }

        let bpb = Bpb::parse(bytes);
        Ok(Volume { bytes, bpb })
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    /// The FAT link for `cluster`.
    fn fat_entry(&self, cluster: u16) -> u16 {
        assert!(cluster >= FIRST_DATA_CLUSTER);
        u16_at(self.bytes, self.bpb.fat_offset() + cluster as usize * 2)
    }

    fn cluster_data(&self, cluster: u16) -> &[u8] {
        assert!(cluster >= FIRST_DATA_CLUSTER);
        let start = self.bpb.data_offset()
            + (cluster - FIRST_DATA_CLUSTER) as usize * self.bpb.cluster_size();
        &self.bytes[start..start + self.bpb.cluster_size()]
    }

    /// Scans the whole root directory for an exact 8.3 match. Never-used
    /// and deleted slots and long-name fragments are skipped.
    pub fn locate(&self, name: &[u8; 8], ext: &[u8; 3]) -> Option<DirEntry> {
        let dir_offset = self.bpb.root_dir_offset();

        for i in 0..self.bpb.root_entries as usize {
            let bytes = &self.bytes[dir_offset + i * DIR_ENTRY_SIZE..];
            if bytes[0] == ENTRY_EMPTY || bytes[0] == ENTRY_DELETED {
                continue;
            }

            let entry = DirEntry::parse(bytes);
            if entry.attributes == ATTR_LONG_NAME {
                continue;
            }

            if entry.name == *name && entry.ext == *ext {
                return Some(entry);
            }
        }

        None
    }

    /// Copies the entry's cluster chain into `dest` and returns how many
    /// bytes were copied. The chain is followed through the FAT; it may end
    /// before `size` bytes are available, in which case the copy is short.
    pub fn load(&self, entry: &DirEntry, dest: &mut [u8]) -> Result<usize, Fat16Error> {
        let size = entry.size as usize;
        assert!(dest.len() >= size);

        if size == 0 {
            return Ok(0);
        }

        let cluster_size = self.bpb.cluster_size();
        let mut cluster = entry.first_cluster;
        let mut copied = 0usize;

        while copied < size {
            // A chain escaping the data area is as fatal as a bad-cluster
            // mark.
            if cluster < FIRST_DATA_CLUSTER {
                return Err(Fat16Error::BadCluster);
            }

            let link = self.fat_entry(cluster);
            if link == BAD_CLUSTER {
                return Err(Fat16Error::BadCluster);
            }

            let take = usize::min(size - copied, cluster_size);
            dest[copied..copied + take].copy_from_slice(&self.cluster_data(cluster)[..take]);
            copied += take;

            if link >= END_OF_CHAIN {
                break;
            }
            cluster = link;
        }

        Ok(copied)
    }

    /// Loads `path` from the root directory. `Ok(true)` means the whole file
    /// is in `dest`; `Ok(false)` means the path was rejected, absent, or its
    /// chain ended short of the directory's size field.
    pub fn load_file(&self, path: &str, dest: &mut [u8]) -> Result<bool, Fat16Error> {
        let (name, ext) = match split_path(path) {
            Some(parts) => parts,
            None => return Ok(false),
        };

        let entry = match self.locate(&name, &ext) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let copied = self.load(&entry, dest)?;
        Ok(copied == entry.size as usize)
    }
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::vec;
    use std::vec::Vec;

    const BPS: usize = 512;
    const SPC: usize = 4;
    const CLUSTER: usize = BPS * SPC;
    const RESERVED: usize = 1;
    const FAT_COUNT: usize = 2;
    const SECTORS_PER_FAT: usize = 16;
    const ROOT_ENTRIES: usize = 512;
    const DATA_CLUSTERS: usize = 32;

    const FAT_OFFSET: usize = RESERVED * BPS;
    const ROOT_OFFSET: usize = FAT_OFFSET + FAT_COUNT * SECTORS_PER_FAT * BPS;
    const DATA_OFFSET: usize = ROOT_OFFSET + ROOT_ENTRIES * DIR_ENTRY_SIZE;

    fn blank_volume() -> Vec<u8> {
        let mut vol = vec![0u8; DATA_OFFSET + DATA_CLUSTERS * CLUSTER];
        vol[11..13].copy_from_slice(&(BPS as u16).to_le_bytes());
        vol[13] = SPC as u8;
        vol[14..16].copy_from_slice(&(RESERVED as u16).to_le_bytes());
        vol[16] = FAT_COUNT as u8;
        vol[17..19].copy_from_slice(&(ROOT_ENTRIES as u16).to_le_bytes());
        vol[22..24].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
        vol[0x1FE] = 0x55;
        vol[0x1FF] = 0xAA;
        vol
    }

    fn set_fat(vol: &mut [u8], cluster: u16, link: u16) {
        let off = FAT_OFFSET + cluster as usize * 2;
        vol[off..off + 2].copy_from_slice(&link.to_le_bytes());
    }

    fn set_dir_entry(vol: &mut [u8], slot: usize, first_byte_override: Option<u8>, name: &str, size: u32, first_cluster: u16) {
        let (n, e) = split_path(name).unwrap();
        let off = ROOT_OFFSET + slot * DIR_ENTRY_SIZE;
        vol[off..off + 8].copy_from_slice(&n);
        vol[off + 8..off + 11].copy_from_slice(&e);
        vol[off + 26..off + 28].copy_from_slice(&first_cluster.to_le_bytes());
        vol[off + 28..off + 32].copy_from_slice(&size.to_le_bytes());
        if let Some(b) = first_byte_override {
            vol[off] = b;
        }
    }

    /// Lays `content` across `chain` and links the FAT accordingly.
    fn add_file(vol: &mut [u8], slot: usize, name: &str, content: &[u8], chain: &[u16]) {
        assert!(!chain.is_empty());
        for (i, &cluster) in chain.iter().enumerate() {
            let link = chain.get(i + 1).copied().unwrap_or(0xFFFF);
            set_fat(vol, cluster, link);

            let start = i * CLUSTER;
            if start >= content.len() {
                continue;
            }
            let end = usize::min(start + CLUSTER, content.len());
            let data_off = DATA_OFFSET + (cluster as usize - 2) * CLUSTER;
            vol[data_off..data_off + (end - start)].copy_from_slice(&content[start..end]);
        }
        set_dir_entry(vol, slot, None, name, content.len() as u32, chain[0]);
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn open_rejects_missing_signature() {
        let mut vol = blank_volume();
        vol[0x1FE] = 0;
        assert_eq!(Volume::open(&vol).unwrap_err(), Fat16Error::InvalidSignature);
    }

    #[test]
    fn open_rejects_short_volume() {
        assert_eq!(
            Volume::open(&[0u8; 16]).unwrap_err(),
            Fat16Error::InvalidSignature
        );
    }

    #[test]
    fn open_parses_parameter_block() {
        let vol = blank_volume();
        let volume = Volume::open(&vol).unwrap();
        assert_eq!(volume.bpb().bytes_per_sector, BPS as u16);
        assert_eq!(volume.bpb().sectors_per_cluster, SPC as u8);
        assert_eq!(volume.bpb().cluster_size(), CLUSTER);
    }

    #[test]
    fn split_path_pads_components() {
        assert_eq!(
            split_path("KERNEL.BIN"),
            Some((*b"KERNEL  ", *b"BIN"))
        );
        assert_eq!(split_path("A"), Some((*b"A       ", *b"   ")));
        assert_eq!(split_path("LONGEST8.TXT"), Some((*b"LONGEST8", *b"TXT")));
    }

    #[test]
    fn split_path_rejects_separators_and_overflow() {
        assert_eq!(split_path("BOOT/KERNEL.BIN"), None);
        assert_eq!(split_path("BOOT\\K.BIN"), None);
        assert_eq!(split_path("TOOLONGNAME.BIN"), None);
        assert_eq!(split_path("KERNEL.BINX"), None);
        assert_eq!(split_path("A.B.C"), None);
    }

    #[test]
    fn locate_skips_deleted_and_long_name_entries() {
        let mut vol = blank_volume();
        set_dir_entry(&mut vol, 0, Some(0xE5), "DEAD.BIN", 0, 2);
        // A long-name fragment whose bytes happen to match.
        set_dir_entry(&mut vol, 1, None, "KERNEL.BIN", 0, 2);
        vol[ROOT_OFFSET + DIR_ENTRY_SIZE + 11] = 0x0F;
        add_file(&mut vol, 2, "KERNEL.BIN", &pattern(10), &[3]);

        let volume = Volume::open(&vol).unwrap();
        let (name, ext) = split_path("KERNEL.BIN").unwrap();
        let entry = volume.locate(&name, &ext).unwrap();
        assert_eq!(entry.first_cluster, 3);
        assert_eq!(entry.size, 10);
    }

    #[test]
    fn locate_continues_past_free_slots() {
        let mut vol = blank_volume();
        // Slot 0 never used; the file lives beyond it and must still be
        // found.
        add_file(&mut vol, 1, "KERNEL.BIN", &pattern(10), &[2]);
        let volume = Volume::open(&vol).unwrap();
        let (name, ext) = split_path("KERNEL.BIN").unwrap();
        let entry = volume.locate(&name, &ext).unwrap();
        assert_eq!(entry.first_cluster, 2);
        assert_eq!(entry.size, 10);
    }

    #[test]
    fn load_empty_file_touches_nothing() {
        let mut vol = blank_volume();
        set_dir_entry(&mut vol, 0, None, "EMPTY.BIN", 0, 0);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = [0xAAu8; 16];
        assert!(volume.load_file("EMPTY.BIN", &mut dest).unwrap());
        assert_eq!(dest, [0xAAu8; 16]);
    }

    #[test]
    fn load_single_cluster_file() {
        let content = pattern(CLUSTER);
        let mut vol = blank_volume();
        add_file(&mut vol, 0, "KERNEL.BIN", &content, &[2]);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = vec![0u8; content.len()];
        assert!(volume.load_file("KERNEL.BIN", &mut dest).unwrap());
        assert_eq!(dest, content);
    }

    #[test]
    fn load_multi_cluster_file_with_partial_tail() {
        let content = pattern(3 * CLUSTER + 123);
        let mut vol = blank_volume();
        add_file(&mut vol, 0, "KERNEL.BIN", &content, &[2, 3, 4, 5]);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = vec![0u8; content.len()];
        assert!(volume.load_file("KERNEL.BIN", &mut dest).unwrap());
        assert_eq!(dest, content);
    }

    #[test]
    fn load_follows_nonlinear_chain() {
        let content = pattern(3 * CLUSTER);
        let mut vol = blank_volume();
        add_file(&mut vol, 0, "KERNEL.BIN", &content, &[2, 7, 4]);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = vec![0u8; content.len()];
        assert!(volume.load_file("KERNEL.BIN", &mut dest).unwrap());
        assert_eq!(dest, content);
    }

    #[test]
    fn load_reports_bad_cluster() {
        let content = pattern(2 * CLUSTER);
        let mut vol = blank_volume();
        add_file(&mut vol, 0, "KERNEL.BIN", &content, &[2, 3]);
        set_fat(&mut vol, 2, 0xFFF7);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = vec![0u8; content.len()];
        assert_eq!(
            volume.load_file("KERNEL.BIN", &mut dest).unwrap_err(),
            Fat16Error::BadCluster
        );
    }

    #[test]
    fn short_chain_yields_incomplete_load() {
        // Directory claims two clusters of data, but the chain ends after
        // one.
        let content = pattern(CLUSTER);
        let mut vol = blank_volume();
        add_file(&mut vol, 0, "KERNEL.BIN", &content, &[2]);
        set_dir_entry(&mut vol, 0, None, "KERNEL.BIN", (2 * CLUSTER) as u32, 2);
        let volume = Volume::open(&vol).unwrap();
        let mut dest = vec![0u8; 2 * CLUSTER];
        assert!(!volume.load_file("KERNEL.BIN", &mut dest).unwrap());
    }

    #[test]
    fn missing_file_reported_without_error() {
        let vol = blank_volume();
        let volume = Volume::open(&vol).unwrap();
        let mut dest = [0u8; 16];
        assert!(!volume.load_file("NOPE.BIN", &mut dest).unwrap());
        assert!(!volume.load_file("BOOT/NOPE.BIN", &mut dest).unwrap());
    }

    proptest! {
        #[test]
        fn load_round_trips_any_size(len in 0usize..(4 * CLUSTER + 17)) {
            let content = pattern(len);
            let clusters_needed = usize::max(1, (len + CLUSTER - 1) / CLUSTER);
            let chain: Vec<u16> = (2..2 + clusters_needed as u16).collect();

            let mut vol = blank_volume();
            add_file(&mut vol, 0, "KERNEL.BIN", &content, &chain);
            let volume = Volume::open(&vol).unwrap();

            let mut dest = vec![0u8; usize::max(len, 1)];
            prop_assert!(volume.load_file("KERNEL.BIN", &mut dest).unwrap());
            prop_assert_eq!(&dest[..len], &content[..]);
        }
    }
}
