//! Tests for the WAL
//!
//! These tests verify:
//! - Entry framing and CRC validation
//! - Writer LSN assignment, sync strategies and truncation
//! - Reader frame classification (entry / corrupt / torn tail)
//! - Recovery from clean, empty, torn and corrupted logs
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use confstore::config::WalSyncStrategy;
use confstore::wal::{Frame, Operation, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE};
use confstore::BackendError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("configs/k{}/v1/", i),
        value: format!("value{}", i).into_bytes(),
    }
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite, 0).unwrap();
    for i in 0..count {
        writer.append(put(i)).unwrap();
    }
}

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &PathBuf, entries: &[WalEntry]) -> Vec<usize> {
    let mut file = File::create(path).unwrap();
    let mut sizes = Vec::new();
    for entry in entries {
        let bytes = entry.serialize().unwrap();
        sizes.push(bytes.len());
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
    sizes
}

// =============================================================================
// Entry Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, put(1));
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &7u64.to_le_bytes());
    let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    assert_eq!(crc, WalEntry::compute_crc(&bytes[HEADER_SIZE..]));
}

#[test]
fn test_entry_deserialize_preserves_fields() {
    let entry = WalEntry::new(
        3,
        Operation::Batch {
            puts: vec![("a/".to_string(), b"1".to_vec()), ("b/".to_string(), b"2".to_vec())],
        },
    );

    let decoded = WalEntry::deserialize(&entry.serialize().unwrap()).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_entry_detects_flipped_payload_bit() {
    let mut bytes = WalEntry::new(1, put(1)).serialize().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(BackendError::WalCorruption(_))));
}

#[test]
fn test_entry_rejects_incomplete_input() {
    let bytes = WalEntry::new(1, put(1)).serialize().unwrap();

    assert!(WalEntry::deserialize(&bytes[..HEADER_SIZE - 1]).is_err());
    assert!(WalEntry::deserialize(&bytes[..bytes.len() - 1]).is_err());
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 0).unwrap();

    assert_eq!(writer.append(put(0)).unwrap(), 1);
    assert_eq!(writer.append(put(1)).unwrap(), 2);
    assert_eq!(writer.current_lsn(), 2);
    assert_eq!(writer.entries_since_truncate(), 2);
    assert_eq!(writer.path(), wal_path.as_path());
}

#[test]
fn test_writer_continues_after_last_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 41).unwrap();

    assert_eq!(writer.append(put(0)).unwrap(), 42);
}

#[test]
fn test_writer_batched_sync_still_readable() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer =
            WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 4 }, 0).unwrap();
        for i in 0..10 {
            writer.append(put(i)).unwrap();
        }
        writer.sync().unwrap();
    }

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 10);
}

#[test]
fn test_writer_appends_to_existing_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);

    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 3).unwrap();
        writer.append(put(3)).unwrap();
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(result.last_lsn, 4);
}

#[test]
fn test_writer_truncate_keeps_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 0).unwrap();
    for i in 0..5 {
        writer.append(put(i)).unwrap();
    }

    writer.truncate().unwrap();

    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);
    assert_eq!(writer.entries_since_truncate(), 0);
    assert_eq!(writer.append(put(5)).unwrap(), 6);

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 6);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_reads_entries_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let mut reader = WalReader::open(&wal_path).unwrap();
    let mut lsns = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        lsns.push(entry.lsn);
    }

    assert_eq!(lsns, vec![1, 2, 3, 4, 5]);
    assert_eq!(reader.position(), fs::metadata(&wal_path).unwrap().len());
}

#[test]
fn test_reader_classifies_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    let sizes = write_raw_entries(&wal_path, &[WalEntry::new(1, put(1)), WalEntry::new(2, put(2))]);

    // Chop the second frame in half
    let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len((sizes[0] + sizes[1] / 2) as u64).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_frame().unwrap(), Some(Frame::Entry(_))));
    match reader.next_frame().unwrap() {
        Some(Frame::TornTail { offset }) => assert_eq!(offset, sizes[0] as u64),
        other => panic!("expected torn tail, got {:?}", other),
    }
}

#[test]
fn test_reader_next_entry_fails_on_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw_entries(&wal_path, &[WalEntry::new(1, put(1))]);

    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&wal_path, &bytes).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(matches!(reader.next_entry(), Err(BackendError::WalCorruption(_))));
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_preserves_operations() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite, 0).unwrap();
        writer.append(put(1)).unwrap();
        writer.append(Operation::Delete { key: "configs/k1/v1/".to_string() }).unwrap();
        writer.append(Operation::DeletePrefix { prefix: "groups/".to_string() }).unwrap();
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(matches!(entries[0].operation, Operation::Put { .. }));
    assert!(matches!(entries[1].operation, Operation::Delete { .. }));
    assert!(matches!(entries[2].operation, Operation::DeletePrefix { .. }));
}

#[test]
fn test_recover_truncates_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    let sizes = write_raw_entries(&wal_path, &[WalEntry::new(1, put(1))]);

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0u8; 8]).unwrap();
    file.sync_all().unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), sizes[0] as u64);
}

#[test]
fn test_recover_skips_corrupted_middle_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let sizes = write_raw_entries(
        &wal_path,
        &[WalEntry::new(1, put(1)), WalEntry::new(2, put(2)), WalEntry::new(3, put(3))],
    );

    // Flip a byte inside the second payload
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[sizes[0] + HEADER_SIZE] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 3);
    assert!(!result.was_truncated);
    assert_eq!(entries.iter().map(|e| e.lsn).collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);

    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[1, 2, 3]).unwrap();
    file.sync_all().unwrap();
    let before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), before);
}
