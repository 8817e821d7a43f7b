//! Name Matcher Module
//! Compares a requested file name with the raw 8.3 name of a deleted record

use crate::error::{RecoveryError, Result};

const BASE_LEN: usize = 8;
const EXT_LEN: usize = 3;

/// A user-supplied file name split on its last `.`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetName {
    full: String,
    base: Vec<u8>,
    extension: Option<Vec<u8>>,
}

impl TargetName {
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(RecoveryError::InvalidName(name.to_string()));
        }

        let (base, extension) = match name.rfind('.') {
            Some(dot) => (&name[..dot], Some(name[dot + 1..].as_bytes().to_vec())),
            None => (name, None),
        };

        Ok(TargetName {
            full: name.to_string(),
            base: base.as_bytes().to_vec(),
            extension,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The byte that replaces the deletion marker on recovery
    pub fn first_byte(&self) -> u8 {
        self.full.as_bytes()[0]
    }

    /// Match against the 11 raw name bytes of a deleted record.
    ///
    /// Byte 0 holds the deletion marker and is never compared. Comparison is
    /// byte-exact, with no case folding.
    pub fn matches_deleted(&self, raw: &[u8; 11]) -> bool {
        let base_len = self.base.len();
        if base_len > BASE_LEN {
            return false;
        }
        if base_len > 1 && raw[1..base_len] != self.base[1..] {
            return false;
        }
        if base_len < BASE_LEN && raw[base_len] != b' ' {
            return false;
        }

        match &self.extension {
            None => raw[BASE_LEN] == b' ',
            Some(ext) => {
                if ext.len() > EXT_LEN {
                    return false;
                }
                let mut padded = [b' '; EXT_LEN];
                padded[..ext.len()].copy_from_slice(ext);
                raw[BASE_LEN..] == padded
            }
        }
    }
}
