//! Read-only volume reports: boot sector summary and root directory listing

use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use crate::boot_sector::Geometry;
use crate::directory::DirectoryScanner;
use crate::disk_image::DiskImage;
use crate::error::Result;
use crate::fat_table::FatTable;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    pub num_fats: u8,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
}

impl From<&Geometry> for FsInfo {
    fn from(geometry: &Geometry) -> Self {
        FsInfo {
            num_fats: geometry.num_fats,
            bytes_per_sector: geometry.bytes_per_sector,
            sectors_per_cluster: geometry.sectors_per_cluster,
            reserved_sectors: geometry.reserved_sectors,
        }
    }
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of FATs = {}", self.num_fats)?;
        writeln!(f, "Number of bytes per sector = {}", self.bytes_per_sector)?;
        writeln!(f, "Number of sectors per cluster = {}", self.sectors_per_cluster)?;
        write!(f, "Number of reserved sectors = {}", self.reserved_sectors)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String,
    pub size: u32,
    pub starting_cluster: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RootListing {
    pub entries: Vec<ListedEntry>,
    pub total: usize,
}

impl fmt::Display for RootListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{} (size = {}, starting cluster = {})",
                entry.name, entry.size, entry.starting_cluster
            )?;
        }
        write!(f, "Total entries = {}", self.total)
    }
}

/// Live entries of the root directory, in on-disk order
pub fn list_root<B: Deref<Target = [u8]>>(
    image: &DiskImage<B>,
    geometry: &Geometry,
    fat: &FatTable,
) -> Result<RootListing> {
    let mut entries = Vec::new();
    for entry in DirectoryScanner::root(image, geometry, fat) {
        let entry = entry?;
        if entry.is_deleted() {
            continue;
        }
        entries.push(ListedEntry {
            name: entry.display_name(),
            size: entry.file_size,
            starting_cluster: entry.first_cluster,
        });
    }

    let total = entries.len();
    Ok(RootListing { entries, total })
}
