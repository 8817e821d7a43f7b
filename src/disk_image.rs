//! Disk Image Module
//! Memory-mapped access to a raw FAT32 image with typed little-endian accessors

use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{RecoveryError, Result};

/// Byte-addressable disk image.
///
/// All reads and writes go through explicit offsets; the buffer is never
/// reinterpreted as a typed record in place.
pub struct DiskImage<B> {
    bytes: B,
}

impl DiskImage<Mmap> {
    /// Map an image read-only (summary and listing commands)
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the tool assumes exclusive access to the image while it runs.
        let map = unsafe { MmapOptions::new().map(&file)? };
        debug!("Mapped {} read-only ({} bytes)", path.display(), map.len());
        Ok(DiskImage { bytes: map })
    }
}

impl DiskImage<MmapMut> {
    /// Map an image for in-place repair
    pub fn open_writable(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: the tool assumes exclusive access to the image while it runs.
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        debug!("Mapped {} read-write ({} bytes)", path.display(), map.len());
        Ok(DiskImage { bytes: map })
    }

    /// Push pending writes back to the image file
    pub fn flush(&self) -> Result<()> {
        self.bytes.flush()?;
        Ok(())
    }
}

#[cfg(test)]
impl DiskImage<Vec<u8>> {
    /// Wrap an in-memory image
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        DiskImage { bytes }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl<B: Deref<Target = [u8]>> DiskImage<B> {
    /// Total image size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether `len` bytes starting at `offset` lie inside the image
    pub fn contains(&self, offset: u64, len: usize) -> bool {
        offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.size())
    }

    fn range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
        if !self.contains(offset, len) {
            return Err(RecoveryError::OutOfBounds {
                offset,
                len,
                size: self.size(),
            });
        }
        let start = offset as usize;
        Ok(start..start + len)
    }

    /// Borrow `len` bytes at `offset`
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.bytes[range])
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_u32_le(&self, offset: u64) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    /// Copy a fixed-width field out of the image
    pub fn read_fixed_bytes<const N: usize>(&self, offset: u64) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Ok(out)
    }
}

impl<B: DerefMut<Target = [u8]>> DiskImage<B> {
    /// Write `data` back at `offset`
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = self.range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn write_u32_le(&mut self, offset: u64, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(offset, &buf)
    }
}
