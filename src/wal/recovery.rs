//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::BackendError;

use super::reader::{Frame, WalReader};
use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Skip complete frames whose checksum does not match
    /// 3. Truncate a partial write at the end
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult), BackendError> {
        let (entries, result, torn_at) = Self::scan(path)?;

        if let Some(offset) = torn_at {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            tracing::warn!("Truncated partial WAL entry at offset {}", offset);
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult, BackendError> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, Option<u64>), BackendError> {
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut torn_at = None;

        while let Some(frame) = reader.next_frame()? {
            match frame {
                Frame::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = result.last_lsn.max(entry.lsn);
                    entries.push(entry);
                }
                Frame::Corrupt { offset, reason } => {
                    tracing::warn!("Skipping corrupted WAL entry at offset {}: {}", offset, reason);
                    result.entries_corrupted += 1;
                }
                Frame::TornTail { offset } => {
                    result.was_truncated = true;
                    torn_at = Some(offset);
                    break;
                }
            }
        }

        Ok((entries, result, torn_at))
    }
}
