//! WAL Reader
//!
//! Handles reading framed entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::BackendError;

use super::entry::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::WalEntry;

/// One frame read from the log
#[derive(Debug)]
pub enum Frame {
    /// A well-formed entry
    Entry(WalEntry),

    /// A complete frame whose checksum or payload is bad; the reader has
    /// already skipped past it
    Corrupt { offset: u64, reason: String },

    /// The log ends in the middle of a frame (partial write)
    TornTail { offset: u64 },
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last complete frame
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next frame; `Ok(None)` at a clean end of file
    pub fn next_frame(&mut self) -> Result<Option<Frame>, BackendError> {
        let offset = self.position;

        let mut header_bytes = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header_bytes)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => return Ok(Some(Frame::TornTail { offset })),
            _ => {}
        }

        let header = FrameHeader::decode(&header_bytes);
        if header.len > MAX_PAYLOAD_SIZE {
            // A garbage length cannot be skipped reliably
            return Ok(Some(Frame::TornTail { offset }));
        }

        let mut payload = vec![0u8; header.len as usize];
        if read_full(&mut self.reader, &mut payload)? < payload.len() {
            return Ok(Some(Frame::TornTail { offset }));
        }

        self.position += (HEADER_SIZE + payload.len()) as u64;

        match WalEntry::from_payload(header, &payload) {
            Ok(entry) => Ok(Some(Frame::Entry(entry))),
            Err(e) => Ok(Some(Frame::Corrupt {
                offset,
                reason: e.to_string(),
            })),
        }
    }

    /// Read the next valid entry, failing on any damaged frame
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>, BackendError> {
        match self.next_frame()? {
            None => Ok(None),
            Some(Frame::Entry(entry)) => Ok(Some(entry)),
            Some(Frame::Corrupt { offset, reason }) => Err(BackendError::WalCorruption(format!(
                "at offset {}: {}",
                offset, reason
            ))),
            Some(Frame::TornTail { offset }) => Err(BackendError::WalCorruption(format!(
                "partial entry at offset {}",
                offset
            ))),
        }
    }

    /// Offset just past the last complete frame
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Fill `buf` as far as possible, returning the number of bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, BackendError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
