use crate::error::{ChainError, Result};
use crate::payload::Payload;

use super::block::Block;

/// Checks that `block` links to `previous` and that its stored fingerprint
/// matches its current fields. `height` is only used for error reporting.
pub fn verify_link<P: Payload>(previous: &Block<P>, block: &Block<P>, height: usize) -> Result<()> {
    if block.previous_fingerprint != previous.fingerprint {
        return Err(ChainError::InvalidBlockLinkage { height });
    }
    // A payload that no longer encodes cannot match its fingerprint either.
    match block.calculate_fingerprint() {
        Ok(fingerprint) if fingerprint == block.fingerprint => Ok(()),
        _ => Err(ChainError::FingerprintMismatch { height }),
    }
}

/// Walks `blocks` from position 1 and reports the first broken link or
/// fingerprint. The genesis block itself is not checked.
pub fn verify_chain<P: Payload>(blocks: &[Block<P>]) -> Result<()> {
    for (height, pair) in blocks.windows(2).enumerate() {
        verify_link(&pair[0], &pair[1], height + 1)?;
    }
    Ok(())
}
