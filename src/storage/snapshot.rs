//! Snapshot writer and reader

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::BackendError;

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Metadata about a finished snapshot
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub path: PathBuf,
    pub entry_count: u64,
    pub last_lsn: u64,
    pub file_size: u64,
}

/// A fully loaded snapshot
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// LSN of the last WAL entry reflected in `entries`
    pub last_lsn: u64,
    pub entries: Vec<(String, Bytes)>,
}

/// Writes a snapshot to a temporary file and renames it into place on finish
pub struct SnapshotWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    data_hasher: crc32fast::Hasher,
}

impl SnapshotWriter {
    /// Start a snapshot that will replace `path` when finished
    pub fn create(path: &Path) -> Result<Self, BackendError> {
        let tmp_path = path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?; // Placeholder for entry count

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add an entry (callers pass entries in key order)
    pub fn add(&mut self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let key_len = (key.len() as u32).to_le_bytes();
        let val_len = (value.len() as u32).to_le_bytes();

        for chunk in [&key_len[..], &val_len[..], key.as_bytes(), value] {
            self.writer.write_all(chunk)?;
            self.data_hasher.update(chunk);
        }

        self.entry_count += 1;
        Ok(())
    }

    /// Write the footer, patch the entry count, fsync and rename into place
    pub fn finish(mut self, last_lsn: u64) -> Result<SnapshotMeta, BackendError> {
        let data_crc = self.data_hasher.finalize();

        self.writer.write_all(&last_lsn.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| BackendError::Snapshot(format!("Failed to flush snapshot: {}", e)))?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;
        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        Ok(SnapshotMeta {
            path: self.path,
            entry_count: self.entry_count,
            last_lsn,
            file_size,
        })
    }
}

/// Load and validate a snapshot file
pub fn read_snapshot(path: &Path) -> Result<Snapshot, BackendError> {
    let data = fs::read(path)?;

    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(BackendError::Snapshot(format!(
            "Snapshot too short: {} bytes",
            data.len()
        )));
    }

    if &data[0..4] != MAGIC {
        return Err(BackendError::Snapshot(format!(
            "Invalid snapshot magic: expected CFGS, got {:?}",
            &data[0..4]
        )));
    }

    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != VERSION {
        return Err(BackendError::Snapshot(format!(
            "Unsupported snapshot version: {}",
            version
        )));
    }

    let entry_count = read_u64(&data[6..14]);
    let footer_start = data.len() - FOOTER_SIZE;
    let last_lsn = read_u64(&data[footer_start..footer_start + 8]);
    let expected_crc = read_u32(&data[footer_start + 8..footer_start + 12]);

    let block = &data[HEADER_SIZE..footer_start];
    let actual_crc = crc32fast::hash(block);
    if actual_crc != expected_crc {
        return Err(BackendError::Snapshot(format!(
            "Snapshot CRC mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut pos = 0;
    while pos < block.len() {
        if pos + 8 > block.len() {
            return Err(truncated(pos));
        }
        let key_len = read_u32(&block[pos..pos + 4]) as usize;
        let val_len = read_u32(&block[pos + 4..pos + 8]) as usize;
        pos += 8;

        if pos + key_len + val_len > block.len() {
            return Err(truncated(pos));
        }
        let key = std::str::from_utf8(&block[pos..pos + key_len])
            .map_err(|e| BackendError::Snapshot(format!("Non UTF-8 key: {}", e)))?
            .to_string();
        pos += key_len;
        let value = Bytes::copy_from_slice(&block[pos..pos + val_len]);
        pos += val_len;

        entries.push((key, value));
    }

    if entries.len() as u64 != entry_count {
        return Err(BackendError::Snapshot(format!(
            "Entry count mismatch: header says {}, found {}",
            entry_count,
            entries.len()
        )));
    }

    Ok(Snapshot { last_lsn, entries })
}

fn truncated(pos: usize) -> BackendError {
    BackendError::Snapshot(format!("Truncated entry at data offset {}", pos))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
