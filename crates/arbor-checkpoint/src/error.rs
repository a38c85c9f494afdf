//! Error types for checkpoint reading and writing.

use std::io;

use thiserror::Error;

/// Errors that can occur while writing or reading a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// An I/O error occurred during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A record's refinement flag is neither `'1'` nor `'0'`.
    #[error("corrupt refinement flag {byte:#04x} in record {record}")]
    CorruptFlag {
        /// The byte found.
        byte: u8,
        /// Index of the offending record.
        record: u64,
    },
    /// The file ends before a record or the trailer.
    #[error("checkpoint truncated: {detail}")]
    Truncated {
        /// What was missing.
        detail: String,
    },
    /// A refined record's child indices do not describe its subtrees.
    #[error("corrupt child offsets in record {record}: {detail}")]
    CorruptOffsets {
        /// Index of the offending record.
        record: u64,
        /// Which offset is wrong.
        detail: String,
    },
    /// The file length does not match the expected record layout.
    #[error("record layout mismatch: expected {expected} bytes, found {found}")]
    RecordSizeMismatch {
        /// Expected byte length.
        expected: u64,
        /// Actual byte length.
        found: u64,
    },
    /// The trailer's record size cannot hold a record header.
    #[error("invalid record size {size}")]
    InvalidRecordSize {
        /// The size read from the trailer.
        size: i64,
    },
    /// A subgrid payload does not fit in one record.
    #[error("payload of {len} bytes exceeds record capacity {capacity}")]
    PayloadTooLarge {
        /// Encoded payload length.
        len: usize,
        /// Payload bytes available per record.
        capacity: usize,
    },
}
