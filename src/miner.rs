//! Proof-of-work nonce search
//!
//! Mining is CPU-bound and blocks the calling thread. [`mine_block`] runs the
//! search in place (or on a dedicated rayon pool when more than one thread is
//! configured); [`mine_block_async`] moves it onto tokio's blocking pool so an
//! async caller's scheduler keeps running.

use crate::blockchain::block::{check_difficulty, Block, Preimage};
use crate::crypto;
use crate::error::{ChainError, Result};
use crate::payload::Payload;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::debug;

/// Nonces tried per worker thread before the deadline is checked again.
const NONCES_PER_THREAD: u64 = 4096;
/// How often the sequential search looks at the clock.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningOptions {
    /// Worker threads; 0 and 1 both mean searching on the calling thread.
    pub threads: usize,
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            max_attempts: None,
            timeout: None,
        }
    }
}

impl MiningOptions {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Tracks attempts and elapsed time against the configured limits.
struct Budget {
    started: Instant,
    attempts: u64,
    max_attempts: Option<u64>,
    timeout: Option<Duration>,
}

impl Budget {
    fn new(options: &MiningOptions) -> Self {
        Self {
            started: Instant::now(),
            attempts: 0,
            max_attempts: options.max_attempts,
            timeout: options.timeout,
        }
    }

    /// Attempts still allowed, capped at `wanted`.
    fn grant(&self, wanted: u64) -> u64 {
        match self.max_attempts {
            Some(max) => wanted.min(max.saturating_sub(self.attempts)),
            None => wanted,
        }
    }

    fn spend(&mut self, attempts: u64) {
        self.attempts = self.attempts.saturating_add(attempts);
    }

    fn exhausted(&self) -> Option<ChainError> {
        let out_of_attempts = self.max_attempts.is_some_and(|max| self.attempts >= max);
        let out_of_time = self.timeout.is_some_and(|t| self.started.elapsed() >= t);
        if out_of_attempts || out_of_time {
            Some(ChainError::MiningDeadlineExceeded {
                attempts: self.attempts,
            })
        } else {
            None
        }
    }
}

/// Mines `block` until its fingerprint has `difficulty` leading zeros.
///
/// The search starts at the block's current nonce. Both the sequential and
/// the parallel search return the lowest satisfying nonce, so the result does
/// not depend on the thread count.
pub fn mine_block<P: Payload>(
    mut block: Block<P>,
    difficulty: u32,
    options: &MiningOptions,
) -> Result<Block<P>> {
    check_difficulty(difficulty)?;
    let preimage = block.preimage()?;
    let started = Instant::now();

    let found = if options.threads > 1 {
        search_parallel(&preimage, block.nonce, difficulty, options)?
    } else {
        search_sequential(&preimage, block.nonce, difficulty, options)?
    };

    let (nonce, fingerprint) = found;
    debug!(
        "Mined block at difficulty {} (nonce {}, {} attempts) in {:?}",
        difficulty,
        nonce,
        nonce.saturating_sub(block.nonce) + 1,
        started.elapsed()
    );
    block.nonce = nonce;
    block.fingerprint = fingerprint;
    Ok(block)
}

fn search_sequential(
    preimage: &Preimage,
    start: u64,
    difficulty: u32,
    options: &MiningOptions,
) -> Result<(u64, String)> {
    let mut budget = Budget::new(options);
    let mut nonce = start;
    loop {
        if budget.grant(1) == 0 {
            return Err(ChainError::MiningDeadlineExceeded {
                attempts: budget.attempts,
            });
        }
        let fingerprint = preimage.fingerprint(nonce);
        budget.spend(1);
        if crypto::has_leading_zeros(&fingerprint, difficulty) {
            return Ok((nonce, fingerprint));
        }
        if budget.attempts % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(err) = budget.exhausted() {
                return Err(err);
            }
        }
        nonce = nonce
            .checked_add(1)
            .ok_or_else(|| ChainError::MiningError("Nonce space exhausted".to_string()))?;
    }
}

fn search_parallel(
    preimage: &Preimage,
    start: u64,
    difficulty: u32,
    options: &MiningOptions,
) -> Result<(u64, String)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads)
        .build()
        .map_err(|e| ChainError::MiningError(format!("Failed to build mining pool: {}", e)))?;

    let batch = NONCES_PER_THREAD * options.threads as u64;
    let mut budget = Budget::new(options);
    let mut next = start;

    pool.install(|| loop {
        let size = budget.grant(batch);
        if size == 0 {
            return Err(ChainError::MiningDeadlineExceeded {
                attempts: budget.attempts,
            });
        }
        let end = next
            .checked_add(size)
            .ok_or_else(|| ChainError::MiningError("Nonce space exhausted".to_string()))?;

        let hit = (next..end)
            .into_par_iter()
            .map(|nonce| (nonce, preimage.fingerprint(nonce)))
            .find_first(|(_, fingerprint)| crypto::has_leading_zeros(fingerprint, difficulty));

        if let Some(found) = hit {
            return Ok(found);
        }
        budget.spend(size);
        if let Some(err) = budget.exhausted() {
            return Err(err);
        }
        next = end;
    })
}

/// Runs [`mine_block`] on tokio's blocking thread pool.
pub async fn mine_block_async<P: Payload>(
    block: Block<P>,
    difficulty: u32,
    options: MiningOptions,
) -> Result<Block<P>> {
    tokio::task::spawn_blocking(move || mine_block(block, difficulty, &options))
        .await
        .map_err(|e| ChainError::MiningError(format!("Mining task failed: {}", e)))?
}
