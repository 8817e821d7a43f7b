//! File Allocation Table Module
//! Cluster-indexed FAT access kept consistent across every FAT copy

use std::ops::{Deref, DerefMut};

use log::{debug, warn};

use crate::boot_sector::Geometry;
use crate::disk_image::DiskImage;
use crate::error::{RecoveryError, Result};

/// FAT32 entries carry 28 significant bits.
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// Lowest value treated as end-of-chain. 0x0FFFFFF7 marks a bad cluster and
/// does not terminate a chain.
pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
/// Marker written at the tail of a rebuilt chain.
pub const END_OF_CHAIN_MARKER: u32 = 0x0FFF_FFFF;
pub const FREE_CLUSTER: u32 = 0;

pub fn is_end_of_chain(value: u32) -> bool {
    (value & FAT_ENTRY_MASK) >= END_OF_CHAIN_MIN
}

/// Locations of every FAT copy.
#[derive(Debug, Clone)]
pub struct FatTable {
    table_offsets: Vec<u64>,
    entry_count: u64,
}

impl FatTable {
    pub fn new(geometry: &Geometry) -> Self {
        let table_offsets = (0..geometry.num_fats as u64)
            .map(|k| geometry.fat_offset() + k * geometry.fat_size_bytes())
            .collect();

        FatTable {
            table_offsets,
            entry_count: geometry.fat_entry_count(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn copies(&self) -> usize {
        self.table_offsets.len()
    }

    /// Raw 32-bit entry for `cluster` from the first FAT copy
    pub fn read_entry<B: Deref<Target = [u8]>>(
        &self,
        image: &DiskImage<B>,
        cluster: u32,
    ) -> Result<u32> {
        self.read_entry_in_copy(image, 0, cluster)
    }

    pub fn read_entry_in_copy<B: Deref<Target = [u8]>>(
        &self,
        image: &DiskImage<B>,
        copy: usize,
        cluster: u32,
    ) -> Result<u32> {
        let base = self.table_offsets.get(copy).copied().ok_or_else(|| {
            RecoveryError::InvalidGeometry(format!("volume has no FAT copy {}", copy))
        })?;
        image.read_u32_le(base + cluster as u64 * 4)
    }

    /// Write `value` into the slot for `cluster` in every FAT copy.
    ///
    /// This is the only path that mutates chain metadata.
    pub fn write_through<B: DerefMut<Target = [u8]>>(
        &self,
        image: &mut DiskImage<B>,
        cluster: u32,
        value: u32,
    ) -> Result<()> {
        for base in &self.table_offsets {
            image.write_u32_le(base + cluster as u64 * 4, value)?;
        }
        debug!("FAT[{}] = {:#010x} ({} copies)", cluster, value, self.table_offsets.len());
        Ok(())
    }

    /// Link `clusters` in order and terminate the chain
    pub fn write_chain<B: DerefMut<Target = [u8]>>(
        &self,
        image: &mut DiskImage<B>,
        clusters: &[u32],
    ) -> Result<()> {
        for pair in clusters.windows(2) {
            self.write_through(image, pair[0], pair[1])?;
        }
        if let Some(&last) = clusters.last() {
            self.write_through(image, last, END_OF_CHAIN_MARKER)?;
        }
        Ok(())
    }

    /// Lazily follow the chain starting at `start`
    pub fn chain<'a, B: Deref<Target = [u8]>>(
        &'a self,
        image: &'a DiskImage<B>,
        start: u32,
    ) -> ClusterChain<'a, B> {
        ClusterChain {
            fat: self,
            image,
            next: Some(start),
            visited: 0,
        }
    }
}

/// Iterator over the clusters of one chain.
///
/// Yields `start` first, then each FAT successor, stopping before an
/// end-of-chain marker, a free or reserved value (0 or 1), or a value past
/// the end of the table. The walk is capped at the table size so a looping
/// chain cannot run forever.
pub struct ClusterChain<'a, B> {
    fat: &'a FatTable,
    image: &'a DiskImage<B>,
    next: Option<u32>,
    visited: u64,
}

impl<'a, B: Deref<Target = [u8]>> Iterator for ClusterChain<'a, B> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if current < 2 || is_end_of_chain(current) || current as u64 >= self.fat.entry_count {
            return None;
        }
        if self.visited >= self.fat.entry_count {
            warn!("Cluster chain exceeds FAT size at cluster {}; stopping", current);
            return None;
        }
        self.visited += 1;

        match self.fat.read_entry(self.image, current) {
            Ok(value) => {
                self.next = Some(value & FAT_ENTRY_MASK);
                Some(Ok(current))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
