//! FAT32 Boot Sector Module
//! Decodes the BIOS Parameter Block into the volume geometry used by every other component

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{Cursor, Seek, SeekFrom};

use crate::error::{RecoveryError, Result};

pub const BOOT_SECTOR_SIZE: usize = 512;

// BPB field offsets
const BPB_BYTES_PER_SECTOR: u64 = 0x0B;
const BPB_SECTORS_PER_CLUSTER: u64 = 0x0D;
const BPB_RESERVED_SECTORS: u64 = 0x0E;
const BPB_NUM_FATS: u64 = 0x10;
const BPB_FAT_SIZE_32: u64 = 0x24;
const BPB_ROOT_CLUSTER: u64 = 0x2C;

/// Volume geometry, derived once from the boot sector and read-only afterwards.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
}

impl Geometry {
    /// Parse the FAT32 boot sector.
    ///
    /// The image is trusted beyond the length and cluster-size checks; no
    /// signature or FAT-type validation is performed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BOOT_SECTOR_SIZE {
            return Err(RecoveryError::InvalidGeometry(format!(
                "boot sector is {} bytes, expected {}",
                data.len(),
                BOOT_SECTOR_SIZE
            )));
        }

        let mut cursor = Cursor::new(data);

        cursor.seek(SeekFrom::Start(BPB_BYTES_PER_SECTOR))?;
        let bytes_per_sector = cursor.read_u16::<LittleEndian>()?;

        cursor.seek(SeekFrom::Start(BPB_SECTORS_PER_CLUSTER))?;
        let sectors_per_cluster = cursor.read_u8()?;

        cursor.seek(SeekFrom::Start(BPB_RESERVED_SECTORS))?;
        let reserved_sectors = cursor.read_u16::<LittleEndian>()?;

        cursor.seek(SeekFrom::Start(BPB_NUM_FATS))?;
        let num_fats = cursor.read_u8()?;

        cursor.seek(SeekFrom::Start(BPB_FAT_SIZE_32))?;
        let sectors_per_fat = cursor.read_u32::<LittleEndian>()?;

        cursor.seek(SeekFrom::Start(BPB_ROOT_CLUSTER))?;
        let root_cluster = cursor.read_u32::<LittleEndian>()?;

        let geometry = Geometry {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            sectors_per_fat,
            root_cluster,
        };

        if geometry.bytes_per_cluster() == 0 {
            return Err(RecoveryError::InvalidGeometry(
                "bytes per cluster is zero".to_string(),
            ));
        }

        Ok(geometry)
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// Byte offset of the first FAT copy
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Size of one FAT copy in bytes
    pub fn fat_size_bytes(&self) -> u64 {
        self.sectors_per_fat as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the data region (after reserved sectors and every FAT copy)
    pub fn data_offset(&self) -> u64 {
        self.fat_offset() + self.num_fats as u64 * self.fat_size_bytes()
    }

    /// Number of 32-bit entries in one FAT copy
    pub fn fat_entry_count(&self) -> u64 {
        self.fat_size_bytes() / 4
    }

    /// Byte offset of a data cluster. Clusters 0 and 1 have no data.
    pub fn cluster_offset(&self, cluster: u32) -> Result<u64> {
        if cluster < 2 {
            return Err(RecoveryError::ReservedCluster(cluster));
        }
        Ok(self.data_offset() + (cluster as u64 - 2) * self.bytes_per_cluster())
    }
}
