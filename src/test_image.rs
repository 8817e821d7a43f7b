//! Synthetic FAT32 images for unit tests
//!
//! Layout: 512-byte sectors, 32 reserved sectors, two single-sector FAT copies
//! (128 entries each), 64 data clusters, root directory at cluster 2.

use sha1::{Digest, Sha1};

pub const BYTES_PER_SECTOR: usize = 512;
pub const RESERVED_SECTORS: usize = 32;
pub const NUM_FATS: usize = 2;
pub const SECTORS_PER_FAT: usize = 1;
pub const DATA_CLUSTERS: usize = 64;
pub const EOC: u32 = 0x0FFF_FFFF;

pub struct ImageBuilder {
    bytes: Vec<u8>,
    sectors_per_cluster: usize,
    root_chain: Vec<u32>,
    next_slot: usize,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::with_sectors_per_cluster(1)
    }

    pub fn with_sectors_per_cluster(sectors_per_cluster: u8) -> Self {
        let spc = sectors_per_cluster as usize;
        let size = (RESERVED_SECTORS + NUM_FATS * SECTORS_PER_FAT) * BYTES_PER_SECTOR
            + DATA_CLUSTERS * spc * BYTES_PER_SECTOR;
        let mut bytes = vec![0u8; size];

        bytes[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bytes[3..11].copy_from_slice(b"MSWIN4.1");
        bytes[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        bytes[13] = sectors_per_cluster;
        bytes[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        bytes[16] = NUM_FATS as u8;
        bytes[36..40].copy_from_slice(&(SECTORS_PER_FAT as u32).to_le_bytes());
        bytes[44..48].copy_from_slice(&2u32.to_le_bytes());
        bytes[82..90].copy_from_slice(b"FAT32   ");
        bytes[510] = 0x55;
        bytes[511] = 0xAA;

        let mut builder = ImageBuilder {
            bytes,
            sectors_per_cluster: spc,
            root_chain: vec![2],
            next_slot: 0,
        };
        builder.set_fat(0, 0x0FFF_FFF8);
        builder.set_fat(1, EOC);
        builder.set_fat(2, EOC);
        builder
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.sectors_per_cluster * BYTES_PER_SECTOR
    }

    fn cluster_offset(&self, cluster: u32) -> usize {
        (RESERVED_SECTORS + NUM_FATS * SECTORS_PER_FAT) * BYTES_PER_SECTOR
            + (cluster as usize - 2) * self.bytes_per_cluster()
    }

    /// Set a FAT entry in every copy
    pub fn set_fat(&mut self, cluster: u32, value: u32) -> &mut Self {
        for copy in 0..NUM_FATS {
            let off = (RESERVED_SECTORS + copy * SECTORS_PER_FAT) * BYTES_PER_SECTOR
                + cluster as usize * 4;
            self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
        }
        self
    }

    /// Append a cluster to the root directory chain
    pub fn extend_root(&mut self, cluster: u32) -> &mut Self {
        let last = *self.root_chain.last().unwrap();
        self.set_fat(last, cluster);
        self.set_fat(cluster, EOC);
        self.root_chain.push(cluster);
        self
    }

    /// Leave a zeroed slot, which ends the directory for any reader
    pub fn end_marker(&mut self) -> &mut Self {
        self.next_slot += 1;
        self
    }

    pub fn add_entry(
        &mut self,
        name: [u8; 11],
        attributes: u8,
        size: u32,
        start: u32,
        deleted: bool,
    ) -> &mut Self {
        let per_cluster = self.bytes_per_cluster() / 32;
        let cluster = self.root_chain[self.next_slot / per_cluster];
        let off = self.cluster_offset(cluster) + (self.next_slot % per_cluster) * 32;
        self.next_slot += 1;

        let record = &mut self.bytes[off..off + 32];
        record[0..11].copy_from_slice(&name);
        if deleted {
            record[0] = 0xE5;
        }
        record[11] = attributes;
        record[20..22].copy_from_slice(&((start >> 16) as u16).to_le_bytes());
        record[26..28].copy_from_slice(&((start & 0xFFFF) as u16).to_le_bytes());
        record[28..32].copy_from_slice(&size.to_le_bytes());
        self
    }

    /// Spread `content` over `clusters` in order
    pub fn write_content(&mut self, clusters: &[u32], content: &[u8]) -> &mut Self {
        let bpc = self.bytes_per_cluster();
        for (i, chunk) in content.chunks(bpc).enumerate() {
            let off = self.cluster_offset(clusters[i]);
            self.bytes[off..off + chunk.len()].copy_from_slice(chunk);
        }
        self
    }

    /// Live file with its chain linked in the FAT
    pub fn add_file(&mut self, name: &str, content: &[u8], clusters: &[u32]) -> &mut Self {
        self.write_content(clusters, content);
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, EOC);
        }
        let start = clusters.first().copied().unwrap_or(0);
        self.add_entry(short_name(name), 0x20, content.len() as u32, start, false)
    }

    /// Deleted file: content stays on disk, FAT entries stay free
    pub fn add_deleted_file(&mut self, name: &str, content: &[u8], clusters: &[u32]) -> &mut Self {
        self.write_content(clusters, content);
        let start = clusters.first().copied().unwrap_or(0);
        self.add_entry(short_name(name), 0x20, content.len() as u32, start, true)
    }

    pub fn add_directory(&mut self, name: &str, cluster: u32) -> &mut Self {
        self.set_fat(cluster, EOC);
        self.add_entry(short_name(name), 0x10, 0, cluster, false)
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// "HELLO.TXT" -> b"HELLO   TXT"
pub fn short_name(name: &str) -> [u8; 11] {
    let mut raw = [b' '; 11];
    let (base, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, ""),
    };
    raw[..base.len()].copy_from_slice(base.as_bytes());
    raw[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    raw
}

pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Deterministic non-repeating filler so that cluster order matters to the digest
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32 * 7 + (i / 512) as u32) as u8)
        .collect()
}

/// FAT entry from copy `copy` of a built image
pub fn fat_entry(image: &[u8], copy: usize, cluster: u32) -> u32 {
    let off = (RESERVED_SECTORS + copy * SECTORS_PER_FAT) * BYTES_PER_SECTOR + cluster as usize * 4;
    u32::from_le_bytes([image[off], image[off + 1], image[off + 2], image[off + 3]])
}
