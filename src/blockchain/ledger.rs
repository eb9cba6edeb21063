use crate::error::{ChainError, Result};
use crate::miner::{mine_block, MiningOptions};
use crate::payload::{BlockData, Payload};
use std::collections::HashMap;
use tracing::{debug, info};

use super::block::{check_difficulty, Block};
use super::validation::{verify_chain, verify_link};

/// Append-only chain of mined blocks plus an index from payload key to the
/// positions of the blocks carrying that key.
#[derive(Debug, Clone)]
pub struct Ledger<P> {
    pub blocks: Vec<Block<P>>,
    pub difficulty: u32,
    pub mining: MiningOptions,
    index: HashMap<String, Vec<usize>>,
}

impl<P: Payload> Ledger<P> {
    /// Create a ledger holding only the genesis block.
    pub fn new(difficulty: u32) -> Result<Self> {
        Self::with_options(difficulty, MiningOptions::default())
    }

    pub fn with_options(difficulty: u32, mining: MiningOptions) -> Result<Self> {
        check_difficulty(difficulty)?;
        Ok(Ledger {
            blocks: vec![Block::genesis()?],
            difficulty,
            mining,
            index: HashMap::new(),
        })
    }

    /// Rebuild a ledger from stored blocks.
    ///
    /// The first block must be the genesis block, the chain must pass
    /// [`Ledger::verify`] and every later block must meet `difficulty`; the
    /// index is replayed from the blocks.
    pub fn from_blocks(blocks: Vec<Block<P>>, difficulty: u32, mining: MiningOptions) -> Result<Self> {
        check_difficulty(difficulty)?;
        let genesis = blocks.first().ok_or(ChainError::InvalidGenesis)?;
        let expected = Block::<P>::genesis()?;
        if !genesis.is_genesis()
            || genesis.fingerprint != expected.fingerprint
            || genesis.calculate_fingerprint()? != expected.fingerprint
        {
            return Err(ChainError::InvalidGenesis);
        }
        verify_chain(&blocks)?;
        if let Some(height) = blocks
            .iter()
            .skip(1)
            .position(|block| !block.meets_difficulty(difficulty))
        {
            return Err(ChainError::InvalidProofOfWork { height: height + 1 });
        }

        let mut ledger = Ledger {
            blocks,
            difficulty,
            mining,
            index: HashMap::new(),
        };
        ledger.rebuild_index()?;
        Ok(ledger)
    }

    pub fn latest_block(&self) -> &Block<P> {
        // Every constructor installs the genesis block and nothing removes blocks.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Number of blocks after genesis.
    pub fn height(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Unmined candidate for `payload`, linked to the current tail.
    ///
    /// The timestamp is the wall clock, bumped past the tail's timestamp when
    /// the clock has not moved forward.
    pub fn next_block(&self, payload: P) -> Result<Block<P>> {
        payload.index_key()?;
        let tail = self.latest_block();
        let after_tail = tail.timestamp.checked_add(1).ok_or_else(|| {
            ChainError::InvalidBlock("Tail timestamp leaves no room for a successor".to_string())
        })?;
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let timestamp = now.max(after_tail);
        Block::new(timestamp, BlockData::Entry(payload), tail.fingerprint.clone())
    }

    /// Mine `payload` into a new block and append it.
    ///
    /// On error the ledger is left exactly as it was.
    pub fn append(&mut self, payload: P) -> Result<&Block<P>> {
        let candidate = self.next_block(payload)?;
        let mined = mine_block(candidate, self.difficulty, &self.mining)?;
        self.apply_block(mined)?;
        Ok(self.latest_block())
    }

    /// Checks that `block` can extend the chain: linked to the tail, carrying
    /// a fresh fingerprint and satisfying the current difficulty.
    pub fn verify_candidate(&self, block: &Block<P>) -> Result<String> {
        let height = self.blocks.len();
        verify_link(self.latest_block(), block, height)?;
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::InvalidProofOfWork { height });
        }
        block
            .index_key()?
            .ok_or_else(|| ChainError::InvalidBlock("Only the first block may be a genesis block".to_string()))
    }

    /// Appends an already mined block after [`Ledger::verify_candidate`].
    pub fn apply_block(&mut self, block: Block<P>) -> Result<()> {
        let key = self.verify_candidate(&block)?;
        let position = self.blocks.len();
        info!(
            "Appended block {} ({}) for key {}",
            position, block.fingerprint, key
        );
        self.index.entry(key).or_default().push(position);
        self.blocks.push(block);
        Ok(())
    }

    /// Blocks recorded under `key`, in append order.
    pub fn lookup(&self, key: &str) -> Vec<&Block<P>> {
        self.index
            .get(key)
            .map(|positions| positions.iter().map(|&i| &self.blocks[i]).collect())
            .unwrap_or_default()
    }

    /// Payloads recorded under `key`, in append order.
    pub fn entries(&self, key: &str) -> Vec<&P> {
        self.lookup(key)
            .into_iter()
            .filter_map(|block| block.payload())
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// `true` when every block links to its predecessor and its stored
    /// fingerprint matches its current fields.
    pub fn validate(&self) -> bool {
        self.verify().is_ok()
    }

    /// Like [`Ledger::validate`], but reports the first failing block.
    pub fn verify(&self) -> Result<()> {
        verify_chain(&self.blocks)
    }

    /// Replays `blocks` into a fresh index.
    pub fn rebuild_index(&mut self) -> Result<()> {
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, block) in self.blocks.iter().enumerate().skip(1) {
            let key = block.index_key()?.ok_or_else(|| {
                ChainError::InvalidBlock(format!("Genesis payload found at height {}", position))
            })?;
            index.entry(key).or_default().push(position);
        }
        debug!("Rebuilt index with {} keys", index.len());
        self.index = index;
        Ok(())
    }
}
