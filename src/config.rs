use crate::error::StoreError;
use crate::store::GraphStore;
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DB_PATH: &str = "msggraph.db";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// What to do with events whose source and target are the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SelfLoopPolicy {
    #[default]
    Keep,
    Drop,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Where `users.csv` and `follows.csv` are staged.
    pub data_dir: PathBuf,
    pub batch_size: usize,
    pub self_loops: SelfLoopPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            self_loops: SelfLoopPolicy::Keep,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn open(&self) -> Result<GraphStore, StoreError> {
        GraphStore::open(&self.db_path, self.timeout)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}
