//! Database persistence layer for HealthChain

use crate::blockchain::{Block, Ledger};
use crate::error::{ChainError, Result};
use crate::miner::MiningOptions;
use crate::payload::{BlockData, Payload};
use rusqlite::{params, Connection, OptionalExtension};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Abstraction for persistence backends. Blocks are written one at a time,
/// keyed by their height, and loaded back in height order.
pub trait Persistence<P: Payload>: Send + Sync {
    fn save_block(&self, height: u64, block: &Block<P>) -> Result<()>;
    fn load_blocks(&self) -> Result<Vec<Block<P>>>;
    fn save_difficulty(&self, difficulty: u32) -> Result<()>;
    fn load_difficulty(&self) -> Result<Option<u32>>;

    /// Loads the stored chain, or starts a new one (saving its genesis block)
    /// when the store is empty. A chain that fails verification is an error.
    fn load_ledger(&self, difficulty: u32, mining: MiningOptions) -> Result<Ledger<P>> {
        let blocks = self.load_blocks()?;
        if blocks.is_empty() {
            info!("No stored chain found, creating genesis block");
            let ledger = Ledger::with_options(difficulty, mining)?;
            self.save_block(0, &ledger.blocks[0])?;
            self.save_difficulty(difficulty)?;
            return Ok(ledger);
        }

        // The ledger difficulty never exceeds the one stored blocks were mined at.
        let difficulty = match self.load_difficulty()? {
            Some(stored) if stored < difficulty => {
                warn!(
                    "Stored chain was mined at difficulty {}, ignoring configured difficulty {}.",
                    stored, difficulty
                );
                stored
            }
            Some(stored) if stored > difficulty => {
                warn!(
                    "Stored difficulty ({}) is above configured difficulty ({}). New blocks use the configured value.",
                    stored, difficulty
                );
                self.save_difficulty(difficulty)?;
                difficulty
            }
            _ => difficulty,
        };

        let ledger = Ledger::from_blocks(blocks, difficulty, mining)?;
        info!("Loaded chain with {} blocks", ledger.blocks.len());
        Ok(ledger)
    }
}

fn lock_poisoned<T>(_: T) -> ChainError {
    ChainError::DatabaseError("Mutex poisoned".to_string())
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                height INTEGER PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                previous_fingerprint TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                index_key TEXT,
                data TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS blocks_by_key ON blocks (index_key)",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create key index: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private database, useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn block_count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(|e| ChainError::DatabaseError(format!("Failed to count blocks: {}", e)))?;
        Ok(count as u64)
    }
}

impl<P: Payload> Persistence<P> for Database {
    fn save_block(&self, height: u64, block: &Block<P>) -> Result<()> {
        let data = serde_json::to_string(&block.data).map_err(|e| {
            ChainError::DatabaseError(format!("Failed to serialize block data: {}", e))
        })?;
        let index_key = block.index_key()?;

        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO blocks (height, fingerprint, previous_fingerprint, timestamp, nonce, index_key, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                height as i64,
                block.fingerprint,
                block.previous_fingerprint,
                block.timestamp as i64,
                // SQLite integers are signed; the bit pattern is restored on load.
                block.nonce as i64,
                index_key,
                data,
            ],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save block: {}", e)))?;

        Ok(())
    }

    fn load_blocks(&self) -> Result<Vec<Block<P>>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let mut stmt = conn
            .prepare(
                "SELECT height, fingerprint, previous_fingerprint, timestamp, nonce, data
                 FROM blocks ORDER BY height ASC",
            )
            .map_err(|e| ChainError::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| ChainError::DatabaseError(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (height, fingerprint, previous_fingerprint, timestamp, nonce, data) =
                row.map_err(|e| ChainError::DatabaseError(format!("Failed to load block: {}", e)))?;

            if height as usize != blocks.len() {
                return Err(ChainError::DatabaseError(format!(
                    "Missing block at height {}",
                    blocks.len()
                )));
            }

            let data: BlockData<P> = serde_json::from_str(&data).map_err(|e| {
                ChainError::DatabaseError(format!(
                    "Failed to deserialize block {}: {}",
                    height, e
                ))
            })?;

            blocks.push(Block {
                timestamp: timestamp as u64,
                data,
                previous_fingerprint,
                nonce: nonce as u64,
                fingerprint,
            });
        }

        Ok(blocks)
    }

    fn save_difficulty(&self, difficulty: u32) -> Result<()> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('difficulty', ?1)",
            params![difficulty.to_string()],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save difficulty: {}", e)))?;

        Ok(())
    }

    fn load_difficulty(&self) -> Result<Option<u32>> {
        let conn = self.conn.lock().map_err(lock_poisoned)?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'difficulty'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to load difficulty: {}", e)))?;

        value
            .map(|v| {
                v.parse::<u32>().map_err(|e| {
                    ChainError::DatabaseError(format!("Invalid stored difficulty {:?}: {}", v, e))
                })
            })
            .transpose()
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone)]
pub struct InMemoryPersistence<P> {
    pub blocks: Arc<Mutex<Vec<Block<P>>>>,
    pub difficulty: Arc<Mutex<Option<u32>>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Default for InMemoryPersistence<P> {
    fn default() -> Self {
        Self {
            blocks: Arc::new(Mutex::new(Vec::new())),
            difficulty: Arc::new(Mutex::new(None)),
            _payload: PhantomData,
        }
    }
}

impl<P> InMemoryPersistence<P> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: Payload> Persistence<P> for InMemoryPersistence<P> {
    fn save_block(&self, height: u64, block: &Block<P>) -> Result<()> {
        let mut blocks = self.blocks.lock().map_err(lock_poisoned)?;
        let height = height as usize;
        if height < blocks.len() {
            blocks[height] = block.clone();
        } else if height == blocks.len() {
            blocks.push(block.clone());
        } else {
            return Err(ChainError::DatabaseError(format!(
                "Cannot save block {} before block {}",
                height,
                blocks.len()
            )));
        }
        Ok(())
    }

    fn load_blocks(&self) -> Result<Vec<Block<P>>> {
        let blocks = self.blocks.lock().map_err(lock_poisoned)?;
        Ok(blocks.clone())
    }

    fn save_difficulty(&self, difficulty: u32) -> Result<()> {
        let mut diff = self.difficulty.lock().map_err(lock_poisoned)?;
        *diff = Some(difficulty);
        Ok(())
    }

    fn load_difficulty(&self) -> Result<Option<u32>> {
        let diff = self.difficulty.lock().map_err(lock_poisoned)?;
        Ok(*diff)
    }
}
