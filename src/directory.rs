//! Directory Scanner Module
//! Walks the 32-byte records of a directory's cluster chain

use std::ops::Deref;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::boot_sector::Geometry;
use crate::disk_image::DiskImage;
use crate::error::Result;
use crate::fat_table::{ClusterChain, FatTable, FAT_ENTRY_MASK};

pub const DIR_ENTRY_SIZE: u64 = 32;
pub const DELETED_MARKER: u8 = 0xE5;
pub const END_OF_DIRECTORY: u8 = 0x00;
pub const ATTR_DIRECTORY: u8 = 0x10;

/// Lifecycle state of a directory record
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Live,
    Deleted,
}

/// A directory record decoded from the image, plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Byte offset of the record within the image
    pub offset: u64,
    /// 8 base + 3 extension bytes, space padded
    pub name: [u8; 11],
    pub attributes: u8,
    pub file_size: u32,
    pub first_cluster: u32,
}

impl DirEntry {
    pub fn decode(offset: u64, record: &[u8; 32]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&record[0..11]);

        let cluster_high = LittleEndian::read_u16(&record[20..22]) as u32;
        let cluster_low = LittleEndian::read_u16(&record[26..28]) as u32;

        DirEntry {
            offset,
            name,
            attributes: record[11],
            file_size: LittleEndian::read_u32(&record[28..32]),
            first_cluster: ((cluster_high << 16) | cluster_low) & FAT_ENTRY_MASK,
        }
    }

    pub fn state(&self) -> EntryState {
        if self.name[0] == DELETED_MARKER {
            EntryState::Deleted
        } else {
            EntryState::Live
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == EntryState::Deleted
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// 8.3 name for display: `NAME.EXT`, or `NAME/` for directories
    pub fn display_name(&self) -> String {
        let base = trim_padding(&self.name[0..8]);
        let ext = trim_padding(&self.name[8..11]);

        let mut out: String = base.iter().map(|&b| b as char).collect();
        if self.is_directory() {
            out.push('/');
        } else if !ext.is_empty() {
            out.push('.');
            out.extend(ext.iter().map(|&b| b as char));
        }
        out
    }
}

fn trim_padding(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &field[..end]
}

/// Lazy walk over every record of a directory, in on-disk order.
///
/// Ends at the first record whose name starts with 0x00, even mid-cluster,
/// or when the directory's cluster chain ends.
pub struct DirectoryScanner<'a, B> {
    image: &'a DiskImage<B>,
    geometry: &'a Geometry,
    clusters: ClusterChain<'a, B>,
    cluster_base: Option<u64>,
    slot: u64,
    finished: bool,
}

impl<'a, B: Deref<Target = [u8]>> DirectoryScanner<'a, B> {
    pub fn new(
        image: &'a DiskImage<B>,
        geometry: &'a Geometry,
        fat: &'a FatTable,
        start_cluster: u32,
    ) -> Self {
        DirectoryScanner {
            image,
            geometry,
            clusters: fat.chain(image, start_cluster),
            cluster_base: None,
            slot: 0,
            finished: false,
        }
    }

    /// Scanner over the root directory
    pub fn root(image: &'a DiskImage<B>, geometry: &'a Geometry, fat: &'a FatTable) -> Self {
        Self::new(image, geometry, fat, geometry.root_cluster)
    }

    fn slots_per_cluster(&self) -> u64 {
        self.geometry.bytes_per_cluster() / DIR_ENTRY_SIZE
    }

    fn next_record_offset(&mut self) -> Option<Result<u64>> {
        loop {
            if let Some(base) = self.cluster_base {
                if self.slot < self.slots_per_cluster() {
                    let offset = base + self.slot * DIR_ENTRY_SIZE;
                    self.slot += 1;
                    return Some(Ok(offset));
                }
            }

            let cluster = match self.clusters.next()? {
                Ok(cluster) => cluster,
                Err(e) => return Some(Err(e)),
            };
            match self.geometry.cluster_offset(cluster) {
                Ok(base) => {
                    self.cluster_base = Some(base);
                    self.slot = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<'a, B: Deref<Target = [u8]>> Iterator for DirectoryScanner<'a, B> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = self.next_record_offset().and_then(|offset| {
            let entry = offset.and_then(|offset| {
                let record = self.image.read_fixed_bytes::<32>(offset)?;
                Ok(DirEntry::decode(offset, &record))
            });
            match entry {
                Ok(entry) if entry.name[0] == END_OF_DIRECTORY => None,
                other => Some(other),
            }
        });

        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_image::{short_name, ImageBuilder};

    fn scan(bytes: Vec<u8>) -> Vec<DirEntry> {
        let image = DiskImage::from_bytes(bytes);
        let geometry = Geometry::parse(image.slice(0, 512).unwrap()).unwrap();
        let fat = FatTable::new(&geometry);
        DirectoryScanner::root(&image, &geometry, &fat)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_decode_record() {
        let mut record = [0u8; 32];
        record[0..11].copy_from_slice(b"README  MD ");
        record[11] = 0x20;
        record[20..22].copy_from_slice(&0x0001u16.to_le_bytes());
        record[26..28].copy_from_slice(&0x0203u16.to_le_bytes());
        record[28..32].copy_from_slice(&4242u32.to_le_bytes());

        let entry = DirEntry::decode(96, &record);
        assert_eq!(entry.offset, 96);
        assert_eq!(entry.first_cluster, 0x0001_0203);
        assert_eq!(entry.file_size, 4242);
        assert_eq!(entry.state(), EntryState::Live);
        assert_eq!(entry.display_name(), "README.MD");

        // top four bits of the high word are reserved
        record[20..22].copy_from_slice(&0xFFFFu16.to_le_bytes());
        record[26..28].copy_from_slice(&0xFFFFu16.to_le_bytes());
        assert_eq!(DirEntry::decode(96, &record).first_cluster, 0x0FFF_FFFF);
    }

    #[test]
    fn test_display_names() {
        let entry = |name: &str, attributes: u8| DirEntry {
            offset: 0,
            name: short_name(name),
            attributes,
            file_size: 0,
            first_cluster: 0,
        };

        assert_eq!(entry("HELLO.TXT", 0x20).display_name(), "HELLO.TXT");
        assert_eq!(entry("NOEXT", 0x20).display_name(), "NOEXT");
        assert_eq!(entry("DIR", 0x10).display_name(), "DIR/");
        assert_eq!(entry("LONGNAME.C", 0x20).display_name(), "LONGNAME.C");
    }

    #[test]
    fn test_scan_classifies_entries() {
        let entries = scan(
            ImageBuilder::new()
                .add_file("LIVE.TXT", b"live", &[3])
                .add_deleted_file("GONE.TXT", b"gone", &[4])
                .add_directory("SUB", 5)
                .build(),
        );

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].display_name(), "LIVE.TXT");
        assert!(entries[1].is_deleted());
        assert_eq!(&entries[1].name[1..], &short_name("GONE.TXT")[1..]);
        assert_eq!(entries[1].first_cluster, 4);
        assert!(entries[2].is_directory());
    }

    #[test]
    fn test_scan_stops_at_end_marker() {
        let entries = scan(
            ImageBuilder::new()
                .add_file("FIRST.TXT", b"1", &[3])
                .end_marker()
                .add_file("HIDDEN.TXT", b"2", &[4])
                .build(),
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name(), "FIRST.TXT");
    }

    #[test]
    fn test_scan_follows_directory_chain() {
        let mut builder = ImageBuilder::new();
        builder.extend_root(40);
        // 16 records fill the first root cluster
        for i in 0..17 {
            builder.add_file(&format!("F{}.TXT", i), b"x", &[3 + i]);
        }
        let entries = scan(builder.build());

        assert_eq!(entries.len(), 17);
        assert_eq!(entries[16].display_name(), "F16.TXT");
        let geometry = Geometry::parse(&builder.build()).unwrap();
        assert_eq!(entries[16].offset, geometry.cluster_offset(40).unwrap());
    }
}
