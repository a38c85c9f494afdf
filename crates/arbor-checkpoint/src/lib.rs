//! Checkpoint format for Arbor octrees.
//!
//! A checkpoint is one flat file of fixed-size records, one per node in
//! depth-first pre-order, followed by a trailer of global scalars.
//!
//! # Format
//!
//! ```text
//! [Record 0] [Record 1] ... [Record N-1] [Trailer]
//!
//! Record (record_size bytes, at offset k * record_size):
//!   flag             u8        b'1' refined | b'0' leaf
//!   child_records    i64 x 8   record index of each child subtree
//!   step_num         i64
//!   current_time     f64
//!   rotational_time  f64
//!   payload          opaque subgrid bytes, zero-padded
//!
//! Trailer (40 bytes):
//!   omega f64, pivot f64 x 3, record_size i64
//! ```
//!
//! All values are little-endian.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use error::CheckpointError;
pub use reader::CheckpointReader;
pub use types::{
    child_record_indices, record_size_for, Record, RecordFlag, RecordHeader, Trailer, CHILD_SLOTS,
    HEADER_LEN, TRAILER_LEN,
};
pub use writer::{append_record, finish_file, RecordWriter};
