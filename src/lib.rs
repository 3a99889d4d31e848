//! # confstore
//!
//! A versioned configuration-distribution store with:
//! - Versioned single configs and label-partitioned config groups
//! - Canonical label selectors mapped onto hierarchical key prefixes
//! - Exactly-once mutations under client-supplied idempotency keys
//! - A pluggable KV backend (in-memory, or WAL + snapshot on disk)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Facade                           │
//! │            (Request -> Response, status mapping)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Idempotency Guard                           │
//! │              (claim / replay / release)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ ConfigStore │          │ GroupStore  │
//!   └──────┬──────┘          └──────┬──────┘
//!          └────────────┬───────────┘
//!                       ▼
//!               ┌──────────────┐      ┌──────────────┐
//!               │  KvBackend   │─────▶│ WAL/Snapshot │
//!               │ (key space)  │      │  (durable)   │
//!               └──────────────┘      └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod model;
pub mod keyspace;
pub mod kv;
pub mod wal;
pub mod storage;
pub mod store;
pub mod idempotency;
pub mod service;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BackendError, Result, StoreError};
pub use config::Config;
pub use context::{CancelToken, Context};
pub use idempotency::IdempotencyGuard;
pub use kv::{DurableBackend, KvBackend, MemoryBackend};
pub use service::{Request, Response, Service, Status};
pub use store::{ConfigStore, GroupStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of confstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
