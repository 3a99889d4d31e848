//! KV Backend Module
//!
//! The hierarchical key-value contract the stores are built on, plus two
//! implementations.
//!
//! ## Responsibilities
//! - Point put/get/delete on exact keys
//! - Prefix listing and subtree deletion
//! - Conditional writes (compare-and-put, guarded batches) so composite
//!   "check then write" operations are atomic
//!
//! ## Implementations
//! - [`MemoryBackend`]: ordered in-memory map, nothing persisted
//! - [`DurableBackend`]: WAL + in-memory key table + snapshot compaction
//!
//! An empty listing and a prefix that never existed are indistinguishable.

mod durable;
mod memory;
mod table;

use bytes::Bytes;

use crate::error::BackendError;

pub use durable::DurableBackend;
pub use memory::MemoryBackend;
pub use table::KeyTable;

/// Result type for backend calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A precondition evaluated atomically with a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// At least one key starts with the prefix
    PrefixPresent(String),

    /// No key starts with the prefix
    PrefixAbsent(String),
}

impl Guard {
    /// Evaluate this guard against a prefix-existence oracle
    pub fn holds(&self, has_prefix: impl Fn(&str) -> bool) -> bool {
        match self {
            Guard::PrefixPresent(prefix) => has_prefix(prefix),
            Guard::PrefixAbsent(prefix) => !has_prefix(prefix),
        }
    }
}

/// A set of puts applied all-or-nothing, gated by guards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub guards: Vec<Guard>,
    pub puts: Vec<(String, Bytes)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a guard; guards are evaluated in insertion order
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn put(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.puts.push((key.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.puts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty()
    }
}

/// Outcome of [`KvBackend::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every guard held and every put was applied
    Committed,

    /// The guard at this index failed; nothing was written
    Rejected { guard: usize },
}

/// Hierarchical key-value store consumed by the stores
///
/// Implementations are shared across request threads behind an `Arc` and
/// must be `Send + Sync`. Each call is atomic on its own.
pub trait KvBackend: Send + Sync {
    /// Write `value` at `key`, replacing any previous value
    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()>;

    /// Read the value at exactly `key`
    fn get(&self, key: &str) -> BackendResult<Option<Bytes>>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order
    fn list(&self, prefix: &str) -> BackendResult<Vec<(String, Bytes)>>;

    /// Remove exactly `key`; removing an absent key is not an error
    fn delete(&self, key: &str) -> BackendResult<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize>;

    /// Write `value` only if the current value at `key` equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> BackendResult<bool>;

    /// Remove `key` only if its current value equals `expected`. Returns
    /// whether the key was removed.
    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> BackendResult<bool>;

    /// Apply `batch` atomically if all of its guards hold
    fn commit(&self, batch: WriteBatch) -> BackendResult<CommitOutcome>;

    /// Write only if `key` is absent
    fn put_if_absent(&self, key: &str, value: &[u8]) -> BackendResult<bool> {
        self.compare_and_put(key, None, value)
    }

    /// Whether any key starts with `prefix`
    fn has_prefix(&self, prefix: &str) -> BackendResult<bool> {
        Ok(!self.list(prefix)?.is_empty())
    }
}
