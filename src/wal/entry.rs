//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::BackendError;

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single payload; larger length fields are treated as garbage
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The mutation to replay
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Mutations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: String, value: Vec<u8> },

    /// Delete a single key
    Delete { key: String },

    /// Delete every key under a prefix
    DeletePrefix { prefix: String },

    /// A committed guarded batch; guards were already evaluated, so replay
    /// only re-applies the puts
    Batch { puts: Vec<(String, Vec<u8>)> },
}

#[derive(Serialize, Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);
        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        }
    }
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Serialize into a framed record: header followed by bincode payload
    pub fn serialize(&self) -> Result<Vec<u8>, BackendError> {
        let payload = bincode::serialize(&Payload {
            operation: self.operation.clone(),
            timestamp: self.timestamp,
        })
        .map_err(|e| BackendError::Serialization(e.to_string()))?;

        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(BackendError::Serialization(format!(
                "WAL payload too large: {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let crc = Self::compute_crc(&payload);
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.lsn.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Deserialize a complete framed record, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BackendError> {
        if bytes.len() < HEADER_SIZE {
            return Err(BackendError::WalCorruption(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = FrameHeader::decode(&header_bytes);

        let end = HEADER_SIZE + header.len as usize;
        if bytes.len() < end {
            return Err(BackendError::WalCorruption(format!(
                "Incomplete payload: expected {} bytes, got {}",
                header.len,
                bytes.len() - HEADER_SIZE
            )));
        }

        Self::from_payload(header, &bytes[HEADER_SIZE..end])
    }

    /// Decode a payload whose header has already been read
    pub fn from_payload(header: FrameHeader, payload: &[u8]) -> Result<Self, BackendError> {
        let actual = Self::compute_crc(payload);
        if actual != header.crc {
            return Err(BackendError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, actual
            )));
        }

        let decoded: Payload = bincode::deserialize(payload)
            .map_err(|e| BackendError::WalCorruption(format!("Undecodable payload: {}", e)))?;

        Ok(Self {
            lsn: header.lsn,
            operation: decoded.operation,
            timestamp: decoded.timestamp,
        })
    }

    pub fn compute_crc(payload: &[u8]) -> u32 {
        crc32fast::hash(payload)
    }
}
