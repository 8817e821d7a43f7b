//! Error types for the recovery engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecoveryError>;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{name}: file not found")]
    NotFound { name: String },

    #[error("{name}: multiple candidates found")]
    MultipleCandidates { name: String },

    /// No ordering of the lookahead pool reproduced the digest.
    #[error("{name}: file not found")]
    SearchExhausted { name: String },

    #[error("Invalid SHA-1 digest: {0}")]
    InvalidDigest(String),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Access of {len} bytes at offset {offset} is outside the image ({size} bytes)")]
    OutOfBounds { offset: u64, len: usize, size: u64 },

    #[error("Cluster {0} is reserved and has no data")]
    ReservedCluster(u32),

    #[error("Invalid FAT32 geometry: {0}")]
    InvalidGeometry(String),
}

impl RecoveryError {
    /// True for the handled outcomes that are reported to the user rather than treated as failures.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            RecoveryError::NotFound { .. }
                | RecoveryError::MultipleCandidates { .. }
                | RecoveryError::SearchExhausted { .. }
        )
    }
}
