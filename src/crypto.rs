//! Hashing primitives for HealthChain

use sha2::{Digest, Sha256};

/// Hex length of a SHA-256 digest, and therefore the highest meaningful difficulty.
pub const MAX_DIFFICULTY: u32 = 64;

/// SHA-256 of `bytes`, rendered as 64 lowercase hex characters.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of the concatenation of `parts`, without building the joined buffer.
///
/// `digest_parts(&[a, b])` is always equal to `digest(&[a, b].concat())`.
pub fn digest_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Whether `fingerprint` starts with at least `difficulty` `'0'` characters.
pub fn has_leading_zeros(fingerprint: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    fingerprint.len() >= difficulty && fingerprint.bytes().take(difficulty).all(|b| b == b'0')
}
