//! Storage Module
//!
//! Point-in-time snapshots of the durable backend's key table. A snapshot
//! plus the WAL entries after its LSN reproduce the full key space.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "CFGS" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each entry, in key order ...         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   LastLsn: u64 (8) | DataCRC: u32 (4) | Padding (4)     │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod snapshot;

pub use snapshot::{read_snapshot, Snapshot, SnapshotMeta, SnapshotWriter};

// =============================================================================
// Shared Constants
// =============================================================================

/// Magic bytes identifying a confstore snapshot file
pub(crate) const MAGIC: &[u8; 4] = b"CFGS";

/// Current snapshot format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Footer size: LastLsn (8) + DataCRC (4) + Padding (4) = 16 bytes
pub(crate) const FOOTER_SIZE: usize = 16;
