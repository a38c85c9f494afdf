//! Checkpoint writers.
//!
//! [`RecordWriter`] streams fixed-size records to any `Write` sink. The
//! tree save is pre-order and one node at a time, so the engine instead uses
//! [`append_record`] and [`finish_file`], which reopen the checkpoint file
//! per record and verify that records land at `index * record_size`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::codec::{encode_record, encode_trailer};
use crate::error::CheckpointError;
use crate::types::{Record, Trailer, HEADER_LEN};

/// Writes checkpoint records to a byte stream.
///
/// # Examples
///
/// ```
/// use arbor_checkpoint::{CheckpointReader, Record, RecordFlag, RecordHeader, RecordWriter, Trailer};
/// use std::io::Cursor;
///
/// let mut writer = RecordWriter::new(Vec::new(), 128).unwrap();
/// let header = RecordHeader {
///     flag: RecordFlag::Leaf,
///     child_records: [1; 8],
///     step_num: 0,
///     current_time: 0.0,
///     rotational_time: 0.0,
/// };
/// writer.write_record(&Record { header, payload: vec![1, 2, 3] }).unwrap();
/// let bytes = writer.finish(&Trailer { omega: 0.0, pivot: [0.0; 3], record_size: 128 }).unwrap();
///
/// let mut reader = CheckpointReader::open(Cursor::new(bytes)).unwrap();
/// assert_eq!(reader.record_count(), 1);
/// assert_eq!(reader.read_record(0).unwrap().header, header);
/// ```
pub struct RecordWriter<W: Write> {
    writer: W,
    record_size: u64,
    records_written: u64,
}

impl<W: Write> RecordWriter<W> {
    /// Create a writer for records of `record_size` bytes.
    pub fn new(writer: W, record_size: u64) -> Result<Self, CheckpointError> {
        if record_size < HEADER_LEN as u64 {
            return Err(CheckpointError::InvalidRecordSize {
                size: record_size as i64,
            });
        }
        Ok(Self {
            writer,
            record_size,
            records_written: 0,
        })
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &Record) -> Result<(), CheckpointError> {
        encode_record(&mut self.writer, record, self.record_size)?;
        self.records_written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Append the trailer, flush, and return the sink.
    pub fn finish(mut self, trailer: &Trailer) -> Result<W, CheckpointError> {
        if trailer.record_size != self.record_size {
            return Err(CheckpointError::RecordSizeMismatch {
                expected: self.record_size,
                found: trailer.record_size,
            });
        }
        encode_trailer(&mut self.writer, trailer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write record `index` to the checkpoint file at `path`.
///
/// Index 0 truncates the file; later indices append. The file must already
/// hold exactly `index` records.
pub fn append_record(
    path: &Path,
    index: u64,
    record_size: u64,
    record: &Record,
) -> Result<(), CheckpointError> {
    let file = if index == 0 {
        File::create(path)?
    } else {
        OpenOptions::new().append(true).open(path)?
    };
    let expected = index * record_size;
    let found = file.metadata()?.len();
    if found != expected {
        return Err(CheckpointError::RecordSizeMismatch { expected, found });
    }
    let mut w = BufWriter::new(file);
    encode_record(&mut w, record, record_size)?;
    w.flush()?;
    Ok(())
}

/// Verify that `path` holds exactly `records` records and append the
/// trailer.
pub fn finish_file(path: &Path, records: u64, trailer: &Trailer) -> Result<(), CheckpointError> {
    let file = OpenOptions::new().append(true).open(path)?;
    let expected = records * trailer.record_size;
    let found = file.metadata()?.len();
    if found != expected {
        return Err(CheckpointError::RecordSizeMismatch { expected, found });
    }
    let mut w = BufWriter::new(file);
    encode_trailer(&mut w, trailer)?;
    w.flush()?;
    Ok(())
}
