//! Tests for the KV backend contract
//!
//! These tests verify:
//! - Point put/get/delete on the in-memory backend
//! - Prefix listing order and trailing-separator isolation
//! - Subtree deletion
//! - Compare-and-put / compare-and-delete semantics
//! - Guarded batches are all-or-nothing
//! - Concurrent readers and writers on the key table

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use confstore::kv::{CommitOutcome, Guard, KeyTable, KvBackend, MemoryBackend, WriteBatch};

// =============================================================================
// Helper Functions
// =============================================================================

fn backend_with(keys: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for key in keys {
        backend.put(key, key.as_bytes()).unwrap();
    }
    backend
}

fn listed_keys(backend: &MemoryBackend, prefix: &str) -> Vec<String> {
    backend
        .list(prefix)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_and_get() {
    let backend = MemoryBackend::new();
    backend.put("configs/a/v1/", b"hello").unwrap();

    assert_eq!(backend.get("configs/a/v1/").unwrap(), Some(Bytes::from_static(b"hello")));
    assert_eq!(backend.get("configs/a/v2/").unwrap(), None);
}

#[test]
fn test_put_overwrites() {
    let backend = MemoryBackend::new();
    backend.put("k/", b"one").unwrap();
    backend.put("k/", b"two").unwrap();

    assert_eq!(backend.get("k/").unwrap().unwrap(), Bytes::from_static(b"two"));
    assert_eq!(backend.len(), 1);
}

#[test]
fn test_delete_absent_key_is_ok() {
    let backend = MemoryBackend::new();
    backend.delete("missing/").unwrap();
    assert!(backend.is_empty());
}

#[test]
fn test_delete_removes_only_exact_key() {
    let backend = backend_with(&["a/", "a/b/"]);
    backend.delete("a/").unwrap();

    assert_eq!(backend.get("a/").unwrap(), None);
    assert!(backend.get("a/b/").unwrap().is_some());
}

// =============================================================================
// Prefix Listing Tests
// =============================================================================

#[test]
fn test_list_returns_key_order() {
    let backend = backend_with(&["g/1/c/", "g/1/a/", "g/1/b/", "g/2/a/"]);

    assert_eq!(listed_keys(&backend, "g/1/"), vec!["g/1/a/", "g/1/b/", "g/1/c/"]);
}

#[test]
fn test_list_trailing_separator_isolates_versions() {
    let backend = backend_with(&["configs/x/v1/", "configs/x/v10/"]);

    assert_eq!(listed_keys(&backend, "configs/x/v1/"), vec!["configs/x/v1/"]);
    assert_eq!(listed_keys(&backend, "configs/x/").len(), 2);
}

#[test]
fn test_list_missing_prefix_is_empty() {
    let backend = backend_with(&["a/"]);
    assert!(backend.list("b/").unwrap().is_empty());
    assert!(!backend.has_prefix("b/").unwrap());
    assert!(backend.has_prefix("a/").unwrap());
}

#[test]
fn test_delete_prefix_removes_subtree() {
    let backend = backend_with(&["g/1/v1/a/", "g/1/v1/b/", "g/1/v2/a/", "g/2/v1/a/"]);

    let removed = backend.delete_prefix("g/1/v1/").unwrap();

    assert_eq!(removed, 2);
    assert!(backend.list("g/1/v1/").unwrap().is_empty());
    assert_eq!(backend.len(), 2);
}

// =============================================================================
// Conditional Write Tests
// =============================================================================

#[test]
fn test_put_if_absent() {
    let backend = MemoryBackend::new();

    assert!(backend.put_if_absent("k/", b"first").unwrap());
    assert!(!backend.put_if_absent("k/", b"second").unwrap());
    assert_eq!(backend.get("k/").unwrap().unwrap(), Bytes::from_static(b"first"));
}

#[test]
fn test_compare_and_put_requires_matching_value() {
    let backend = backend_with(&["k/"]);

    assert!(!backend.compare_and_put("k/", Some(&b"other"[..]), b"new").unwrap());
    assert!(!backend.compare_and_put("k/", None, b"new").unwrap());
    assert!(backend.compare_and_put("k/", Some(&b"k/"[..]), b"new").unwrap());
    assert_eq!(backend.get("k/").unwrap().unwrap(), Bytes::from_static(b"new"));
}

#[test]
fn test_compare_and_delete() {
    let backend = backend_with(&["k/"]);

    assert!(!backend.compare_and_delete("k/", b"other").unwrap());
    assert!(backend.get("k/").unwrap().is_some());

    assert!(backend.compare_and_delete("k/", b"k/").unwrap());
    assert!(backend.get("k/").unwrap().is_none());

    assert!(!backend.compare_and_delete("k/", b"k/").unwrap());
}

// =============================================================================
// Guarded Batch Tests
// =============================================================================

#[test]
fn test_commit_without_guards_applies_all() {
    let backend = MemoryBackend::new();
    let batch = WriteBatch::new().put("a/", "1").put("b/", "2");
    assert_eq!(batch.len(), 2);

    assert_eq!(backend.commit(batch).unwrap(), CommitOutcome::Committed);
    assert_eq!(backend.len(), 2);
}

#[test]
fn test_commit_rejected_writes_nothing() {
    let backend = backend_with(&["groups/g/v1/x/"]);

    let batch = WriteBatch::new()
        .guard(Guard::PrefixPresent("groups/g/".to_string()))
        .guard(Guard::PrefixAbsent("groups/g/v1/".to_string()))
        .put("groups/g/v1/y/", "1")
        .put("groups/g/v1/z/", "2");

    assert_eq!(backend.commit(batch).unwrap(), CommitOutcome::Rejected { guard: 1 });
    assert_eq!(backend.len(), 1);
}

#[test]
fn test_commit_reports_first_failing_guard() {
    let backend = MemoryBackend::new();

    let batch = WriteBatch::new()
        .guard(Guard::PrefixPresent("missing/".to_string()))
        .guard(Guard::PrefixPresent("also-missing/".to_string()))
        .put("x/", "1");

    assert_eq!(backend.commit(batch).unwrap(), CommitOutcome::Rejected { guard: 0 });
    assert!(backend.is_empty());
}

#[test]
fn test_guard_holds() {
    let present = |prefix: &str| prefix == "yes/";

    assert!(Guard::PrefixPresent("yes/".into()).holds(present));
    assert!(!Guard::PrefixPresent("no/".into()).holds(present));
    assert!(Guard::PrefixAbsent("no/".into()).holds(present));
    assert!(!Guard::PrefixAbsent("yes/".into()).holds(present));
}

// =============================================================================
// Key Table Tests
// =============================================================================

#[test]
fn test_table_tracks_size() {
    let table = KeyTable::new();
    table.put("ab".to_string(), Bytes::from_static(b"123"));
    assert_eq!(table.size(), 5);

    table.put("ab".to_string(), Bytes::from_static(b"1"));
    assert_eq!(table.size(), 3);

    table.delete("ab");
    assert_eq!(table.size(), 0);
    assert!(table.is_empty());
}

#[test]
fn test_table_from_entries_and_clear() {
    let table = KeyTable::from_entries(vec![
        ("b/".to_string(), Bytes::from_static(b"2")),
        ("a/".to_string(), Bytes::from_static(b"1")),
    ]);

    let keys: Vec<String> = table.entries().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["a/", "b/"]);

    table.clear();
    assert_eq!(table.entry_count(), 0);
    assert_eq!(table.size(), 0);
}

#[test]
fn test_table_concurrent_put_if_absent_single_winner() {
    let backend = Arc::new(MemoryBackend::new());
    let mut handles = Vec::new();

    for i in 0..8 {
        let backend = Arc::clone(&backend);
        handles.push(thread::spawn(move || {
            backend
                .put_if_absent("idempotency/k/", format!("{}", i).as_bytes())
                .unwrap()
        }));
    }

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_table_concurrent_readers_see_consistent_batches() {
    let backend = Arc::new(MemoryBackend::new());

    let writer = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for i in 0..200 {
                let batch = WriteBatch::new()
                    .put(format!("g/{}/a/", i), "1")
                    .put(format!("g/{}/b/", i), "2");
                backend.commit(batch).unwrap();
            }
        })
    };

    let reader = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for i in 0..200 {
                let count = backend.list(&format!("g/{}/", i)).unwrap().len();
                assert!(count == 0 || count == 2, "saw partial batch: {}", count);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(backend.len(), 400);
}
