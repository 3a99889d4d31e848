//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::BackendError;

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// File length after the last successful append
    committed_len: u64,
    /// LSN assigned to the most recent append
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Entries written since the last truncate
    entries_since_truncate: usize,
}

impl WalWriter {
    /// Open or create a WAL file, continuing numbering after `last_lsn`
    ///
    /// Existing contents are kept; new entries are appended.
    pub fn open(
        path: &Path,
        sync_strategy: WalSyncStrategy,
        last_lsn: u64,
    ) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let committed_len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            committed_len,
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
            entries_since_truncate: 0,
        })
    }

    /// Append an operation, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64, BackendError> {
        let lsn = self.current_lsn + 1;
        let frame = WalEntry::new(lsn, operation).serialize()?;

        if let Err(err) = self.write_frame(&frame) {
            // Never leave a partial frame behind for a later append to complete
            if let Err(rollback_err) = self.rollback() {
                tracing::error!(
                    lsn,
                    "Failed to roll back WAL after append error: {}",
                    rollback_err
                );
            }
            return Err(err);
        }

        self.current_lsn = lsn;
        self.entries_since_truncate += 1;
        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), BackendError> {
        // Step 1: Write and flush the whole frame
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        self.unsynced += 1;

        // Step 2: Sync according to the strategy
        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }

        self.committed_len += frame.len() as u64;
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to the last complete frame
    fn rollback(&mut self) -> Result<(), BackendError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let failed = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // `into_parts` hands back the buffer without flushing it
        let (_file, _discarded) = failed.into_parts();

        self.writer.get_ref().set_len(self.committed_len)?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<(), BackendError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Discard every entry (after they became durable elsewhere)
    ///
    /// LSN numbering continues from the current value.
    pub fn truncate(&mut self) -> Result<(), BackendError> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.committed_len = 0;
        self.unsynced = 0;
        self.entries_since_truncate = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn entries_since_truncate(&self) -> usize {
        self.entries_since_truncate
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
