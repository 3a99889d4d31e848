//! Durable backend
//!
//! Coordinates the WAL, the in-memory key table and snapshots.
//!
//! ## Responsibilities
//! - Log every mutation before it reaches the key table
//! - Evaluate conditional writes and guarded batches atomically
//! - Snapshot the key table and truncate the WAL once it grows past the
//!   compaction threshold
//! - Rebuild the key table from snapshot + WAL on startup

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::Config;
use crate::storage::{read_snapshot, Snapshot, SnapshotMeta, SnapshotWriter};
use crate::wal::{Operation, WalRecovery, WalWriter};

use super::{BackendResult, CommitOutcome, KeyTable, KvBackend, WriteBatch};

/// WAL-backed `KvBackend`
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/compare-and-put/commit/compact): serialized by
///   `write_lock`. Guards and compare values are evaluated while the lock is
///   held, so no other writer can change the outcome before the WAL append.
/// - **Reads** (get/list): go straight to the key table's RwLock.
pub struct DurableBackend {
    config: Config,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Current key space
    table: KeyTable,

    snapshot_path: PathBuf,

    /// Serializes write operations
    write_lock: Mutex<()>,
}

impl DurableBackend {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SNAPSHOT_FILENAME: &'static str = "snapshot.db";

    /// Open or create a backend with the given config
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Load the snapshot if one exists
    /// 3. Replay WAL entries newer than the snapshot
    /// 4. Continue LSN numbering after the highest LSN seen
    pub fn open(config: Config) -> BackendResult<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        let snapshot_path = config.data_dir.join(Self::SNAPSHOT_FILENAME);

        let snapshot = if snapshot_path.exists() {
            read_snapshot(&snapshot_path)?
        } else {
            Snapshot::default()
        };
        let snapshot_lsn = snapshot.last_lsn;
        let snapshot_entries = snapshot.entries.len();
        let table = KeyTable::from_entries(snapshot.entries);

        let mut last_lsn = snapshot_lsn;
        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;

            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    truncated = result.was_truncated,
                    "WAL recovery complete"
                );
            }

            // Entries at or below the snapshot LSN are already in the table
            for entry in entries.into_iter().filter(|e| e.lsn > snapshot_lsn) {
                replay(&table, entry.operation);
            }
            last_lsn = last_lsn.max(result.last_lsn);
        }

        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy, last_lsn)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            snapshot_entries,
            keys = table.entry_count(),
            last_lsn,
            "Durable backend opened"
        );

        Ok(Self {
            config,
            wal: Mutex::new(wal),
            table,
            snapshot_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> BackendResult<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Snapshot the key table and truncate the WAL
    pub fn compact(&self) -> BackendResult<SnapshotMeta> {
        let _write_guard = self.write_lock.lock();
        self.compact_internal()
    }

    /// Sync the WAL and release the backend
    pub fn close(self) -> BackendResult<()> {
        let _write_guard = self.write_lock.lock();
        self.wal.lock().sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of keys currently stored
    pub fn entry_count(&self) -> usize {
        self.table.entry_count()
    }

    /// WAL entries written since the last compaction
    pub fn wal_entries(&self) -> usize {
        self.wal.lock().entries_since_truncate()
    }

    pub fn current_lsn(&self) -> u64 {
        self.wal.lock().current_lsn()
    }

    // =========================================================================
    // Private Helpers (called with write lock held)
    // =========================================================================

    fn append(&self, operation: Operation) -> BackendResult<()> {
        self.wal.lock().append(operation)?;
        Ok(())
    }

    /// Compact once the WAL reaches the threshold.
    ///
    /// Runs after a write is already logged and applied, so a failure here
    /// is not the write's failure: it is logged and retried on a later write.
    fn maybe_compact(&self) {
        let threshold = self.config.compaction_threshold;
        if threshold == 0 || self.wal.lock().entries_since_truncate() < threshold {
            return;
        }
        if let Err(err) = self.compact_internal() {
            tracing::warn!(
                wal_entries = self.wal.lock().entries_since_truncate(),
                "Compaction failed, will retry on next write: {}",
                err
            );
        }
    }

    fn compact_internal(&self) -> BackendResult<SnapshotMeta> {
        let mut wal = self.wal.lock();
        let last_lsn = wal.current_lsn();

        // Step 1: Write every live key to a fresh snapshot
        let mut writer = SnapshotWriter::create(&self.snapshot_path)?;
        for (key, value) in self.table.entries() {
            writer.add(&key, &value)?;
        }
        let meta = writer.finish(last_lsn)?;

        // Step 2: Truncate WAL (entries are now durable in the snapshot)
        wal.truncate()?;

        tracing::info!(
            entries = meta.entry_count,
            last_lsn = meta.last_lsn,
            bytes = meta.file_size,
            "Compacted key table into snapshot"
        );
        Ok(meta)
    }
}

/// Apply a logged operation to the table during recovery
fn replay(table: &KeyTable, operation: Operation) {
    match operation {
        Operation::Put { key, value } => {
            table.put(key, Bytes::from(value));
        }
        Operation::Delete { key } => {
            table.delete(&key);
        }
        Operation::DeletePrefix { prefix } => {
            table.delete_prefix(&prefix);
        }
        Operation::Batch { puts } => {
            table.apply_puts(
                puts.into_iter()
                    .map(|(key, value)| (key, Bytes::from(value)))
                    .collect(),
            );
        }
    }
}

impl KvBackend for DurableBackend {
    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        let _write_guard = self.write_lock.lock();

        // Step 1: Write to WAL first (durability guarantee)
        self.append(Operation::Put {
            key: key.to_string(),
            value: value.to_vec(),
        })?;

        // Step 2: Write to the key table
        self.table.put(key.to_string(), Bytes::copy_from_slice(value));

        self.maybe_compact();
        Ok(())
    }

    fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        Ok(self.table.get(key))
    }

    fn list(&self, prefix: &str) -> BackendResult<Vec<(String, Bytes)>> {
        Ok(self.table.scan_prefix(prefix))
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        let _write_guard = self.write_lock.lock();

        self.append(Operation::Delete {
            key: key.to_string(),
        })?;
        self.table.delete(key);

        self.maybe_compact();
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize> {
        let _write_guard = self.write_lock.lock();

        if !self.table.has_prefix(prefix) {
            return Ok(0);
        }

        self.append(Operation::DeletePrefix {
            prefix: prefix.to_string(),
        })?;
        let removed = self.table.delete_prefix(prefix);

        self.maybe_compact();
        Ok(removed)
    }

    fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> BackendResult<bool> {
        let _write_guard = self.write_lock.lock();

        if !self.table.matches(key, expected) {
            return Ok(false);
        }

        self.append(Operation::Put {
            key: key.to_string(),
            value: value.to_vec(),
        })?;
        self.table.put(key.to_string(), Bytes::copy_from_slice(value));

        self.maybe_compact();
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> BackendResult<bool> {
        let _write_guard = self.write_lock.lock();

        if !self.table.matches(key, Some(expected)) {
            return Ok(false);
        }

        self.append(Operation::Delete {
            key: key.to_string(),
        })?;
        self.table.delete(key);

        self.maybe_compact();
        Ok(true)
    }

    fn commit(&self, batch: WriteBatch) -> BackendResult<CommitOutcome> {
        let _write_guard = self.write_lock.lock();

        if let Some(index) = self.table.check_guards(&batch) {
            return Ok(CommitOutcome::Rejected { guard: index });
        }

        let puts: Vec<(String, Vec<u8>)> = batch
            .puts
            .iter()
            .map(|(key, value)| (key.clone(), value.to_vec()))
            .collect();
        self.append(Operation::Batch { puts })?;
        self.table.apply_puts(batch.puts);

        self.maybe_compact();
        Ok(CommitOutcome::Committed)
    }

    fn has_prefix(&self, prefix: &str) -> BackendResult<bool> {
        Ok(self.table.has_prefix(prefix))
    }
}
