//! In-memory backend
//!
//! Not persisted across restarts. Used by tests and for embedding the stores
//! in a process that owns its own durability.

use bytes::Bytes;

use super::{BackendResult, CommitOutcome, KeyTable, KvBackend, WriteBatch};

/// `KvBackend` over a single [`KeyTable`]
#[derive(Default)]
pub struct MemoryBackend {
    table: KeyTable,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.table.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.table.put(key.to_string(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        Ok(self.table.get(key))
    }

    fn list(&self, prefix: &str) -> BackendResult<Vec<(String, Bytes)>> {
        Ok(self.table.scan_prefix(prefix))
    }

    fn delete(&self, key: &str) -> BackendResult<()> {
        self.table.delete(key);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> BackendResult<usize> {
        Ok(self.table.delete_prefix(prefix))
    }

    fn compare_and_put(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> BackendResult<bool> {
        Ok(self
            .table
            .compare_and_put(key, expected, Bytes::copy_from_slice(value)))
    }

    fn compare_and_delete(&self, key: &str, expected: &[u8]) -> BackendResult<bool> {
        Ok(self.table.compare_and_delete(key, expected))
    }

    fn commit(&self, batch: WriteBatch) -> BackendResult<CommitOutcome> {
        Ok(self.table.commit(batch))
    }

    fn has_prefix(&self, prefix: &str) -> BackendResult<bool> {
        Ok(self.table.has_prefix(prefix))
    }
}
