use crate::blockchain::{Block, Ledger};
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::miner::mine_block_async;
use crate::payload::Payload;
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Owns a ledger and its store, and serializes writers.
///
/// Appends hold the write lock from candidate construction until the block is
/// stored, so two callers can never mine on the same tail.
pub struct LedgerNode<P: Payload> {
    pub config: Config,
    pub ledger: Arc<RwLock<Ledger<P>>>,
    pub persistence: Arc<dyn Persistence<P>>,
}

impl<P: Payload> Clone for LedgerNode<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            persistence: self.persistence.clone(),
        }
    }
}

impl<P: Payload> LedgerNode<P> {
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;
        info!(
            "Starting HealthChain ledger (difficulty = {})",
            config.ledger.difficulty
        );

        let persistence: Arc<dyn Persistence<P>> = if config.database.in_memory {
            Arc::new(InMemoryPersistence::new())
        } else {
            match open_database(&config.database.path) {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    warn!(
                        "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                        config.database.path, e
                    );
                    Arc::new(InMemoryPersistence::new())
                }
            }
        };

        Self::with_persistence(config, persistence)
    }

    pub fn with_persistence(config: Config, persistence: Arc<dyn Persistence<P>>) -> Result<Self> {
        let ledger =
            persistence.load_ledger(config.ledger.difficulty, config.mining_options())?;
        Ok(Self {
            config,
            ledger: Arc::new(RwLock::new(ledger)),
            persistence,
        })
    }

    /// Mines `payload` on a blocking worker, stores the block, then appends it.
    ///
    /// Nothing is stored or appended unless every step succeeds.
    pub async fn append(&self, payload: P) -> Result<Block<P>> {
        let mut ledger = self.ledger.write().await;
        let candidate = ledger.next_block(payload)?;
        let started = Instant::now();
        let mined = mine_block_async(candidate, ledger.difficulty, ledger.mining.clone()).await?;

        ledger.verify_candidate(&mined)?;
        let height = ledger.blocks.len() as u64;
        self.persistence.save_block(height, &mined)?;
        ledger.apply_block(mined.clone())?;

        info!(
            "Mined block {} in {}",
            height,
            humantime::format_duration(started.elapsed())
        );
        Ok(mined)
    }

    pub async fn lookup(&self, key: &str) -> Vec<Block<P>> {
        self.ledger
            .read()
            .await
            .lookup(key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn validate(&self) -> bool {
        self.ledger.read().await.validate()
    }

    pub async fn verify(&self) -> Result<()> {
        self.ledger.read().await.verify()
    }

    /// Difficulty new blocks are mined at.
    pub async fn difficulty(&self) -> u32 {
        self.ledger.read().await.difficulty
    }

    pub async fn height(&self) -> usize {
        self.ledger.read().await.height()
    }

    /// Copy of every block, genesis first.
    pub async fn snapshot(&self) -> Vec<Block<P>> {
        self.ledger.read().await.blocks.clone()
    }
}

fn open_database(path: &str) -> Result<Database> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                ChainError::IoError(format!("Failed to create data dir {:?}: {}", parent, e))
            })?;
        }
    }
    Database::open(path)
}
