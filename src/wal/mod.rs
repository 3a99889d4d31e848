//! Write-Ahead Log (WAL) Module
//!
//! Provides durability for the durable backend through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any mutation reaches the key table
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering against snapshots
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is the bincode-encoded operation and timestamp; the CRC covers it.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{FrameHeader, Operation, WalEntry, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use reader::{Frame, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
