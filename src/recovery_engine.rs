//! FAT32 Recovery Engine
//! Restores deleted root-directory files in place by repairing their directory
//! entry and File Allocation Table chain
//!
//! Features:
//! - Contiguous recovery: full scan, name match, optional SHA-1 gate, ambiguity detection
//! - Fragmented recovery: bounded permutation search over nearby free clusters,
//!   accepted only when the rebuilt content reproduces the SHA-1 digest
//! - Every FAT write is mirrored to all FAT copies

use std::fmt;
use std::ops::{Deref, DerefMut};

use log::{debug, info, warn};
use serde::Serialize;
use sha1::{Digest, Sha1};

use crate::boot_sector::{Geometry, BOOT_SECTOR_SIZE};
use crate::config::RecoveryConfig;
use crate::directory::{DirEntry, DirectoryScanner, DELETED_MARKER};
use crate::disk_image::DiskImage;
use crate::error::{RecoveryError, Result};
use crate::fat_table::{FatTable, FAT_ENTRY_MASK, FREE_CLUSTER};
use crate::hash_verify::{digest_clusters, digest_contiguous, read_cluster, Sha1Digest};
use crate::name_match::TargetName;

/// A successfully restored file
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RecoveredFile {
    pub name: String,
    pub entry_offset: u64,
    pub file_size: u32,
    pub clusters: Vec<u32>,
    pub verified_with_sha1: bool,
}

impl fmt::Display for RecoveredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verified_with_sha1 {
            write!(f, "{}: successfully recovered with SHA-1", self.name)
        } else {
            write!(f, "{}: successfully recovered", self.name)
        }
    }
}

/// Clusters of a contiguous run covering `file_size` bytes from `start`.
///
/// `None` when the run would pass the largest cluster number.
pub fn contiguous_run(start: u32, file_size: u32, bytes_per_cluster: u64) -> Option<Vec<u32>> {
    let count = u32::try_from((file_size as u64).div_ceil(bytes_per_cluster)).ok()?;
    (0..count).map(|i| start.checked_add(i)).collect()
}

/// Main recovery engine over one disk image
pub struct RecoveryEngine<B> {
    image: DiskImage<B>,
    geometry: Geometry,
    fat: FatTable,
    config: RecoveryConfig,
}

impl<B: Deref<Target = [u8]>> RecoveryEngine<B> {
    /// Decode the boot sector and prepare FAT access
    pub fn new(image: DiskImage<B>, config: RecoveryConfig) -> Result<Self> {
        let geometry = Geometry::parse(image.slice(0, BOOT_SECTOR_SIZE)?)?;
        let fat = FatTable::new(&geometry);

        debug!(
            "Geometry: {} bytes/cluster, {} FATs of {} bytes at {:#x}, data at {:#x}, root {}",
            geometry.bytes_per_cluster(),
            fat.copies(),
            geometry.fat_size_bytes(),
            geometry.fat_offset(),
            geometry.data_offset(),
            geometry.root_cluster
        );

        Ok(RecoveryEngine {
            image,
            geometry,
            fat,
            config,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn image(&self) -> &DiskImage<B> {
        &self.image
    }

    pub fn into_image(self) -> DiskImage<B> {
        self.image
    }

    /// Records of the root directory
    pub fn root_entries(&self) -> DirectoryScanner<'_, B> {
        DirectoryScanner::root(&self.image, &self.geometry, &self.fat)
    }

    /// Deleted root entries whose name matches, in directory order.
    ///
    /// Entries whose cluster run could not be restored (no start cluster for a
    /// non-empty file, or a run past the end of the FAT) are skipped.
    fn deleted_matches(&self, target: &TargetName) -> Result<Vec<DirEntry>> {
        let mut matches = Vec::new();

        for entry in self.root_entries() {
            let entry = entry?;
            if !entry.is_deleted() || !target.matches_deleted(&entry.name) {
                continue;
            }
            if entry.file_size > 0 && entry.first_cluster < 2 {
                warn!(
                    "Deleted entry at {:#x} has {} bytes but no start cluster; skipping",
                    entry.offset, entry.file_size
                );
                continue;
            }
            debug!(
                "Deleted entry at {:#x} matches {} (size {}, cluster {})",
                entry.offset,
                target.as_str(),
                entry.file_size,
                entry.first_cluster
            );
            matches.push(entry);
        }

        Ok(matches)
    }

    /// Every cluster is a data cluster with a slot in the FAT
    fn run_fits_fat(&self, clusters: &[u32]) -> bool {
        clusters
            .iter()
            .all(|&c| c >= 2 && (c as u64) < self.fat.entry_count())
    }

    /// Every deleted entry that matches `name` and, when a digest is given,
    /// whose contiguous content hashes to it, paired with its cluster run.
    /// Scans the whole directory.
    pub fn find_contiguous_candidates(
        &self,
        target: &TargetName,
        digest: Option<&Sha1Digest>,
    ) -> Result<Vec<(DirEntry, Vec<u32>)>> {
        let bytes_per_cluster = self.geometry.bytes_per_cluster();
        let mut candidates = Vec::new();

        for entry in self.deleted_matches(target)? {
            let run = contiguous_run(entry.first_cluster, entry.file_size, bytes_per_cluster);
            let run = match run {
                Some(run) if self.run_fits_fat(&run) => run,
                _ => {
                    warn!(
                        "Entry at {:#x} would run past the end of the FAT; skipping",
                        entry.offset
                    );
                    continue;
                }
            };

            if let Some(expected) = digest {
                let content = digest_contiguous(
                    &self.image,
                    &self.geometry,
                    entry.first_cluster,
                    entry.file_size,
                );
                match content {
                    Ok(actual) if actual == *expected => {}
                    Ok(actual) => {
                        debug!("Entry at {:#x} hashes to {}, rejecting", entry.offset, actual);
                        continue;
                    }
                    Err(e) => {
                        warn!("Could not read content of entry at {:#x}: {}", entry.offset, e);
                        continue;
                    }
                }
            }

            candidates.push((entry, run));
        }

        Ok(candidates)
    }

    /// Start cluster plus every free cluster among the next `lookahead_clusters` slots
    fn candidate_pool(&self, start: u32) -> Result<Vec<u32>> {
        let bytes_per_cluster = self.geometry.bytes_per_cluster() as usize;
        let mut pool = Vec::with_capacity(self.config.max_pool_size());
        pool.push(start);

        for offset in 1..=self.config.lookahead_clusters as u32 {
            let cluster = match start.checked_add(offset) {
                Some(c) if (c as u64) < self.fat.entry_count() => c,
                _ => break,
            };
            if !self.image.contains(self.geometry.cluster_offset(cluster)?, bytes_per_cluster) {
                break;
            }
            if self.fat.read_entry(&self.image, cluster)? & FAT_ENTRY_MASK == FREE_CLUSTER {
                pool.push(cluster);
            }
        }

        Ok(pool)
    }

    /// Search for the cluster order of a fragmented file.
    ///
    /// Returns `None` when no ordering of the candidate pool reproduces `digest`.
    pub fn search_fragmented_chain(
        &self,
        entry: &DirEntry,
        digest: &Sha1Digest,
    ) -> Result<Option<Vec<u32>>> {
        let pool = self.candidate_pool(entry.first_cluster)?;
        let needed = (entry.file_size as u64).div_ceil(self.geometry.bytes_per_cluster()) as usize;

        debug!(
            "Entry at {:#x}: {} clusters needed, pool {:?}",
            entry.offset, needed, pool
        );
        if needed > pool.len() {
            debug!("Pool of {} clusters cannot hold {} clusters", pool.len(), needed);
            return Ok(None);
        }

        let mut search = ChainSearch {
            image: &self.image,
            geometry: &self.geometry,
            pool: &pool,
            used: vec![false; pool.len()],
            sequence: Vec::with_capacity(needed),
            file_size: entry.file_size as u64,
            target: digest,
            orderings_tried: 0,
        };
        let found = search.run()?;
        debug!("Tried {} orderings, found: {}", search.orderings_tried, found);
        if !found {
            return Ok(None);
        }

        let sequence = search.sequence;
        if digest_clusters(&self.image, &self.geometry, &sequence, entry.file_size)? != *digest {
            warn!("Chain {:?} failed re-verification", sequence);
            return Ok(None);
        }
        Ok(Some(sequence))
    }
}

impl<B: DerefMut<Target = [u8]>> RecoveryEngine<B> {
    /// Recover a file assumed to occupy consecutive clusters.
    ///
    /// Nothing is written unless exactly one deleted entry survives the name
    /// and digest filters.
    pub fn recover_contiguous(
        &mut self,
        name: &str,
        digest: Option<&Sha1Digest>,
    ) -> Result<RecoveredFile> {
        let target = TargetName::parse(name)?;
        let mut candidates = self.find_contiguous_candidates(&target, digest)?;

        let (entry, clusters) = match candidates.len() {
            0 => return Err(RecoveryError::NotFound { name: name.to_string() }),
            1 => candidates.remove(0),
            n => {
                info!("{} deleted entries match {}; not recovering", n, name);
                return Err(RecoveryError::MultipleCandidates { name: name.to_string() });
            }
        };

        self.restore(&entry, &target, &clusters)?;

        Ok(RecoveredFile {
            name: name.to_string(),
            entry_offset: entry.offset,
            file_size: entry.file_size,
            clusters,
            verified_with_sha1: digest.is_some(),
        })
    }

    /// Recover a file whose clusters may be out of order, guided by its SHA-1.
    pub fn recover_fragmented(&mut self, name: &str, digest: &Sha1Digest) -> Result<RecoveredFile> {
        let target = TargetName::parse(name)?;
        let candidates = self.deleted_matches(&target)?;
        if candidates.is_empty() {
            return Err(RecoveryError::NotFound { name: name.to_string() });
        }

        for entry in candidates {
            let clusters = if entry.file_size == 0 {
                if Sha1Digest::of(&[]) != *digest {
                    continue;
                }
                Vec::new()
            } else {
                match self.search_fragmented_chain(&entry, digest) {
                    Ok(Some(clusters)) => clusters,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Search for entry at {:#x} failed: {}", entry.offset, e);
                        continue;
                    }
                }
            };

            self.restore(&entry, &target, &clusters)?;
            return Ok(RecoveredFile {
                name: name.to_string(),
                entry_offset: entry.offset,
                file_size: entry.file_size,
                clusters,
                verified_with_sha1: true,
            });
        }

        Err(RecoveryError::SearchExhausted { name: name.to_string() })
    }

    /// Put the real first character back, then link the chain in every FAT copy.
    fn restore(&mut self, entry: &DirEntry, target: &TargetName, clusters: &[u32]) -> Result<()> {
        info!(
            "Restoring {} at entry {:#x} with clusters {:?}",
            target.as_str(),
            entry.offset,
            clusters
        );
        let current = self.image.read_u8(entry.offset)?;
        if current != DELETED_MARKER {
            warn!(
                "Entry at {:#x} is no longer deleted ({:#04x}); leaving it alone",
                entry.offset, current
            );
            return Err(RecoveryError::NotFound { name: target.as_str().to_string() });
        }
        if !self.run_fits_fat(clusters) {
            return Err(RecoveryError::InvalidGeometry(format!(
                "chain {:?} does not fit the FAT of {} entries",
                clusters,
                self.fat.entry_count()
            )));
        }
        self.image.write_bytes(entry.offset, &[target.first_byte()])?;
        self.fat.write_chain(&mut self.image, clusters)
    }
}

/// Depth-first search over orderings of the candidate pool.
///
/// The first pool entry is always placed first. A branch is checked against
/// the digest as soon as its clusters cover the file size and is abandoned
/// on mismatch.
struct ChainSearch<'a, B> {
    image: &'a DiskImage<B>,
    geometry: &'a Geometry,
    pool: &'a [u32],
    used: Vec<bool>,
    sequence: Vec<u32>,
    file_size: u64,
    target: &'a Sha1Digest,
    orderings_tried: u64,
}

impl<'a, B: Deref<Target = [u8]>> ChainSearch<'a, B> {
    fn run(&mut self) -> Result<bool> {
        if self.pool.is_empty() {
            return Ok(false);
        }
        self.place(0, Sha1::new(), 0)
    }

    /// Append `pool[index]` and keep extending from there
    fn place(&mut self, index: usize, hasher: Sha1, covered: u64) -> Result<bool> {
        let cluster = self.pool[index];
        let data = read_cluster(self.image, self.geometry, cluster)?;
        let take = (self.file_size - covered).min(data.len() as u64);

        let mut hasher = hasher;
        hasher.update(&data[..take as usize]);
        self.used[index] = true;
        self.sequence.push(cluster);

        if self.extend(hasher, covered + take)? {
            return Ok(true);
        }

        self.sequence.pop();
        self.used[index] = false;
        Ok(false)
    }

    fn extend(&mut self, hasher: Sha1, covered: u64) -> Result<bool> {
        if covered >= self.file_size {
            self.orderings_tried += 1;
            return Ok(Sha1Digest::from_hasher(hasher) == *self.target);
        }

        for index in 0..self.pool.len() {
            if self.used[index] {
                continue;
            }
            if self.place(index, hasher.clone(), covered)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
