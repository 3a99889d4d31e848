//! Configuration for confstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a confstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the durable backend
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── snapshot.db      (last compacted key table)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Number of WAL entries after which the key table is snapshotted and
    /// the WAL truncated (0 disables automatic compaction)
    pub compaction_threshold: usize,

    // -------------------------------------------------------------------------
    // Idempotency Configuration
    // -------------------------------------------------------------------------
    /// How long a completed idempotency record is honoured (None = forever)
    pub idempotency_ttl: Option<Duration>,

    /// Age after which a pending claim is treated as abandoned
    pub idempotency_pending_timeout: Duration,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./confstore_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            compaction_threshold: 10_000,
            idempotency_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            idempotency_pending_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the number of WAL entries that triggers a snapshot
    pub fn compaction_threshold(mut self, entries: usize) -> Self {
        self.config.compaction_threshold = entries;
        self
    }

    /// Set the idempotency record retention (None keeps records forever)
    pub fn idempotency_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.config.idempotency_ttl = ttl;
        self
    }

    pub fn idempotency_pending_timeout(mut self, timeout: Duration) -> Self {
        self.config.idempotency_pending_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
