use crate::crypto::{self, MAX_DIFFICULTY};
use crate::error::{ChainError, Result};
use crate::miner::{mine_block, MiningOptions};
use crate::payload::{BlockData, Payload};
use serde::{Deserialize, Serialize};

/// Previous fingerprint recorded by the genesis block.
pub const GENESIS_PREVIOUS_FINGERPRINT: &str = "0";
pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;
pub const GENESIS_MARKER: &str = "Genesis Block";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block<P> {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub data: BlockData<P>,
    pub previous_fingerprint: String,
    pub nonce: u64,
    pub fingerprint: String,
}

impl<P: Payload> Block<P> {
    pub fn new(timestamp: u64, data: BlockData<P>, previous_fingerprint: String) -> Result<Self> {
        let mut block = Block {
            timestamp,
            data,
            previous_fingerprint,
            nonce: 0,
            fingerprint: String::new(),
        };
        block.recompute_fingerprint()?;
        Ok(block)
    }

    /// The fixed first block of every ledger. It is never mined.
    pub fn genesis() -> Result<Self> {
        Block::new(
            GENESIS_TIMESTAMP,
            BlockData::Genesis(GENESIS_MARKER.to_string()),
            GENESIS_PREVIOUS_FINGERPRINT.to_string(),
        )
    }

    /// Digest of the block's current fields.
    pub fn calculate_fingerprint(&self) -> Result<String> {
        Ok(self.preimage()?.fingerprint(self.nonce))
    }

    pub fn recompute_fingerprint(&mut self) -> Result<()> {
        self.fingerprint = self.calculate_fingerprint()?;
        Ok(())
    }

    /// Searches nonces until the fingerprint has `difficulty` leading zeros.
    ///
    /// Blocks the calling thread with no upper bound on iterations; use
    /// [`mine_block`] with [`MiningOptions`] to impose one.
    pub fn mine(&mut self, difficulty: u32) -> Result<()> {
        let mined = mine_block(self.clone(), difficulty, &MiningOptions::default())?;
        *self = mined;
        Ok(())
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        difficulty <= MAX_DIFFICULTY && crypto::has_leading_zeros(&self.fingerprint, difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self.data, BlockData::Genesis(_))
            && self.previous_fingerprint == GENESIS_PREVIOUS_FINGERPRINT
    }

    pub fn payload(&self) -> Option<&P> {
        self.data.payload()
    }

    pub fn index_key(&self) -> Result<Option<String>> {
        self.data.index_key()
    }

    pub(crate) fn preimage(&self) -> Result<Preimage> {
        let payload = self.data.canonical_bytes()?;
        Ok(Preimage::new(&self.previous_fingerprint, self.timestamp, &payload))
    }
}

/// Fingerprint input minus the nonce, so mining only re-hashes the last eight bytes.
///
/// Layout: previous fingerprint bytes, timestamp (u64 LE), payload length (u64 LE),
/// payload bytes, then the nonce (u64 LE).
pub(crate) struct Preimage {
    prefix: Vec<u8>,
}

impl Preimage {
    fn new(previous_fingerprint: &str, timestamp: u64, payload: &[u8]) -> Self {
        let mut prefix = Vec::with_capacity(previous_fingerprint.len() + 16 + payload.len());
        prefix.extend_from_slice(previous_fingerprint.as_bytes());
        prefix.extend_from_slice(&timestamp.to_le_bytes());
        prefix.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        prefix.extend_from_slice(payload);
        Preimage { prefix }
    }

    pub(crate) fn fingerprint(&self, nonce: u64) -> String {
        crypto::digest_parts(&[&self.prefix, &nonce.to_le_bytes()])
    }
}

pub(crate) fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidDifficulty(difficulty));
    }
    Ok(())
}
