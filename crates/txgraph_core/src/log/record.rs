//! Commit log records and framing.
//!
//! Frame layout, little-endian:
//!
//! ```text
//! | magic "TXGL" (4) | version u16 (2) | length u32 (4) | CBOR payload | crc32 (4) |
//! ```
//!
//! The checksum covers the header and the payload.

use crate::error::{CoreError, CoreResult};
use crate::store::Write;
use crate::types::{Key, Timestamp, Uid};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"TXGL";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// Bytes before the payload.
pub const HEADER_SIZE: usize = 10;

/// Bytes after the payload.
pub const CRC_SIZE: usize = 4;

/// A durable state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A committed transaction.
    Commit {
        /// Start timestamp.
        start_ts: Timestamp,
        /// Commit timestamp.
        commit_ts: Timestamp,
        /// Conflict keys recorded for the commit.
        keys: Vec<Key>,
        /// Writes made visible at `commit_ts`.
        writes: Vec<Write>,
        /// Highest uid leased when the commit happened.
        max_uid: Uid,
    },
    /// Schema text merged into the schema.
    Schema {
        /// Raw schema text.
        text: String,
    },
    /// Every predicate and every schema entry dropped.
    DropAll {
        /// Timestamp allocated for the drop.
        at: Timestamp,
    },
    /// One predicate dropped.
    DropAttr {
        /// Predicate name.
        predicate: String,
        /// Timestamp allocated for the drop.
        at: Timestamp,
    },
}

impl LogRecord {
    /// Highest timestamp mentioned by the record, if any.
    #[must_use]
    pub fn max_ts(&self) -> Option<Timestamp> {
        match self {
            LogRecord::Commit { commit_ts, .. } => Some(*commit_ts),
            LogRecord::DropAll { at } | LogRecord::DropAttr { at, .. } => Some(*at),
            LogRecord::Schema { .. } => None,
        }
    }

    /// Encodes the record into one frame.
    pub fn encode_frame(&self) -> CoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| CoreError::codec(format!("encoding log record: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::codec("log record payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    /// Decodes a CBOR payload.
    pub fn decode_payload(payload: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(payload)
            .map_err(|e| CoreError::codec(format!("decoding log record: {e}")))
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length.
    pub payload_len: usize,
}

impl FrameHeader {
    /// Validates magic and version.
    pub fn parse(bytes: &[u8], offset: u64) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::log_corruption(offset, "short header"));
        }
        if bytes[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(offset, "invalid magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::log_corruption(
                offset,
                format!("unsupported version {version}"),
            ));
        }
        let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        Ok(Self { payload_len })
    }

    /// Total frame length including header and checksum.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len + CRC_SIZE
    }
}

/// Verifies the checksum of a complete frame and decodes its payload.
pub fn decode_frame(frame: &[u8], offset: u64) -> CoreResult<LogRecord> {
    let header = FrameHeader::parse(frame, offset)?;
    if frame.len() != header.frame_len() {
        return Err(CoreError::log_corruption(offset, "frame length mismatch"));
    }
    let body_end = HEADER_SIZE + header.payload_len;
    let stored = u32::from_le_bytes([
        frame[body_end],
        frame[body_end + 1],
        frame[body_end + 2],
        frame[body_end + 3],
    ]);
    let computed = crc32fast::hash(&frame[..body_end]);
    if stored != computed {
        return Err(CoreError::log_corruption(
            offset,
            format!("checksum mismatch: expected {stored:08x}, got {computed:08x}"),
        ));
    }
    LogRecord::decode_payload(&frame[HEADER_SIZE..body_end])
}
