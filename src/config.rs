//! Configuration management for HealthChain

use crate::crypto::MAX_DIFFICULTY;
use crate::error::{ChainError, Result};
use crate::miner::MiningOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "healthchain.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Leading zero hex characters required of every appended block.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default)]
    pub max_attempts: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            max_attempts: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Keep the chain in memory only; nothing survives the process.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_difficulty() -> u32 {
    2
}

fn default_threads() -> usize {
    1
}

fn default_db_path() -> String {
    "./data/healthchain.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::ConfigError(format!(
                "ledger.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.ledger.difficulty
            )));
        }
        if !self.database.in_memory && self.database.path.trim().is_empty() {
            return Err(ChainError::ConfigError(
                "database.path must be set unless database.in_memory is true".to_string(),
            ));
        }
        if self.miner.max_attempts == Some(0) {
            return Err(ChainError::ConfigError(
                "miner.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ChainError::ConfigError(format!(
                "logging.level {:?} is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn mining_options(&self) -> MiningOptions {
        MiningOptions {
            threads: self.miner.threads,
            max_attempts: self.miner.max_attempts,
            timeout: self.miner.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(source: &str) -> Result<Config> {
    let config: Config = toml::from_str(source)
        .map_err(|e| ChainError::ConfigError(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration at `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let source = fs::read_to_string(path)?;
    parse_config(&source)
}
