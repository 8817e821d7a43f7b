//! Hash Verifier Module
//! SHA-1 checks over candidate file content

use std::fmt;
use std::ops::Deref;

use sha1::{Digest, Sha1};

use crate::boot_sector::Geometry;
use crate::disk_image::DiskImage;
use crate::error::{RecoveryError, Result};

pub const DIGEST_LEN: usize = 20;

/// A 160-bit SHA-1 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha1Digest([u8; DIGEST_LEN]);

impl Sha1Digest {
    /// Decode a 40-character hex string
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| RecoveryError::InvalidDigest(format!("{}: {}", text, e)))?;
        let raw: [u8; DIGEST_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            RecoveryError::InvalidDigest(format!(
                "{}: expected {} bytes, got {}",
                text,
                DIGEST_LEN,
                b.len()
            ))
        })?;
        Ok(Sha1Digest(raw))
    }

    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    pub fn from_hasher(hasher: Sha1) -> Self {
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(&hasher.finalize());
        Sha1Digest(raw)
    }
}

impl fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Digest of `file_size` bytes laid out contiguously from `start_cluster`
pub fn digest_contiguous<B: Deref<Target = [u8]>>(
    image: &DiskImage<B>,
    geometry: &Geometry,
    start_cluster: u32,
    file_size: u32,
) -> Result<Sha1Digest> {
    if file_size == 0 {
        return Ok(Sha1Digest::of(&[]));
    }
    let offset = geometry.cluster_offset(start_cluster)?;
    Ok(Sha1Digest::of(image.slice(offset, file_size as usize)?))
}

/// Digest of the given clusters concatenated in order, cut at `file_size` bytes
pub fn digest_clusters<B: Deref<Target = [u8]>>(
    image: &DiskImage<B>,
    geometry: &Geometry,
    clusters: &[u32],
    file_size: u32,
) -> Result<Sha1Digest> {
    let mut hasher = Sha1::new();
    let mut remaining = file_size as u64;
    for &cluster in clusters {
        if remaining == 0 {
            break;
        }
        let data = read_cluster(image, geometry, cluster)?;
        let take = remaining.min(data.len() as u64) as usize;
        hasher.update(&data[..take]);
        remaining -= take as u64;
    }
    Ok(Sha1Digest::from_hasher(hasher))
}

/// Borrow one full cluster of data
pub fn read_cluster<'a, B: Deref<Target = [u8]>>(
    image: &'a DiskImage<B>,
    geometry: &Geometry,
    cluster: u32,
) -> Result<&'a [u8]> {
    let offset = geometry.cluster_offset(cluster)?;
    image.slice(offset, geometry.bytes_per_cluster() as usize)
}
