//! Error types for HealthChain

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid difficulty {0}: at most {max} leading zeros are possible", max = crate::crypto::MAX_DIFFICULTY)]
    InvalidDifficulty(u32),
    #[error("Mining deadline exceeded after {attempts} attempts")]
    MiningDeadlineExceeded { attempts: u64 },
    #[error("Mining error: {0}")]
    MiningError(String),
    #[error("Invalid block linkage at height {height}")]
    InvalidBlockLinkage { height: usize },
    #[error("Fingerprint mismatch at height {height}")]
    FingerprintMismatch { height: usize },
    #[error("Invalid proof of work at height {height}")]
    InvalidProofOfWork { height: usize },
    #[error("Invalid genesis block")]
    InvalidGenesis,
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
