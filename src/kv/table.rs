//! Key table
//!
//! Ordered in-memory key space shared by both backends. BTreeMap wrapped in
//! an RwLock: ordered keys make prefix listing a range scan, and many readers
//! can list concurrently while a single writer mutates.

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{CommitOutcome, WriteBatch};

struct Inner {
    entries: BTreeMap<String, Bytes>,
    /// Approximate size in bytes (keys + values)
    size: usize,
}

impl Inner {
    fn insert(&mut self, key: String, value: Bytes) {
        let added = key.len() + value.len();
        if let Some(old) = self.entries.insert(key.clone(), value) {
            self.size -= key.len() + old.len();
        }
        self.size += added;
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.size -= key.len() + old.len();
                true
            }
            None => false,
        }
    }

    fn prefix_keys(&self, prefix: &str) -> Vec<String> {
        prefix_range(&self.entries, prefix)
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        prefix_range(&self.entries, prefix).next().is_some()
    }
}

fn prefix_range<'a>(
    entries: &'a BTreeMap<String, Bytes>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Bytes)> + 'a {
    entries
        .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(k, _)| k.starts_with(prefix))
}

/// Ordered key space with interior locking
pub struct KeyTable {
    inner: RwLock<Inner>,
}

impl KeyTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: BTreeMap::new(),
                size: 0,
            }),
        }
    }

    /// Build a table from recovered entries
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Bytes)>) -> Self {
        let table = Self::new();
        {
            let mut inner = table.inner.write();
            for (key, value) in entries {
                inner.insert(key, value);
            }
        }
        table
    }

    // =========================================================================
    // Reads (shared lock)
    // =========================================================================

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.read().entries.get(key).cloned()
    }

    /// All entries under `prefix`, in key order
    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, Bytes)> {
        let inner = self.inner.read();
        prefix_range(&inner.entries, prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.inner.read().has_prefix(prefix)
    }

    /// Whether every guard of `batch` holds right now; returns the index of
    /// the first failing guard otherwise
    pub fn check_guards(&self, batch: &WriteBatch) -> Option<usize> {
        let inner = self.inner.read();
        batch
            .guards
            .iter()
            .position(|guard| !guard.holds(|prefix| inner.has_prefix(prefix)))
    }

    /// Whether the current value at `key` equals `expected`
    pub fn matches(&self, key: &str, expected: Option<&[u8]>) -> bool {
        let inner = self.inner.read();
        inner.entries.get(key).map(|v| &v[..]) == expected
    }

    /// Copy of all entries in key order (for snapshots)
    pub fn entries(&self) -> Vec<(String, Bytes)> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    // =========================================================================
    // Writes (exclusive lock)
    // =========================================================================

    /// Put a key-value pair, returning the new approximate size
    pub fn put(&self, key: String, value: Bytes) -> usize {
        let mut inner = self.inner.write();
        inner.insert(key, value);
        inner.size
    }

    /// Remove a key, returning whether it existed
    pub fn delete(&self, key: &str) -> bool {
        self.inner.write().remove(key)
    }

    /// Remove every key under `prefix`, returning how many were removed
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.write();
        let keys = inner.prefix_keys(prefix);
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    /// Apply every put of a batch without evaluating guards
    pub fn apply_puts(&self, puts: Vec<(String, Bytes)>) {
        let mut inner = self.inner.write();
        for (key, value) in puts {
            inner.insert(key, value);
        }
    }

    /// Compare-and-put under a single exclusive lock
    pub fn compare_and_put(&self, key: &str, expected: Option<&[u8]>, value: Bytes) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.get(key).map(|v| &v[..]) != expected {
            return false;
        }
        inner.insert(key.to_string(), value);
        true
    }

    /// Compare-and-delete under a single exclusive lock
    pub fn compare_and_delete(&self, key: &str, expected: &[u8]) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.get(key).map(|v| &v[..]) != Some(expected) {
            return false;
        }
        inner.remove(key)
    }

    /// Guard check and apply under a single exclusive lock
    pub fn commit(&self, batch: WriteBatch) -> CommitOutcome {
        let mut inner = self.inner.write();
        if let Some(index) = batch
            .guards
            .iter()
            .position(|guard| !guard.holds(|prefix| inner.has_prefix(prefix)))
        {
            return CommitOutcome::Rejected { guard: index };
        }
        for (key, value) in batch.puts {
            inner.insert(key, value);
        }
        CommitOutcome::Committed
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.size = 0;
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}
