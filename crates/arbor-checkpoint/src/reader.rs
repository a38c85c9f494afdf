//! Checkpoint reader.
//!
//! [`CheckpointReader`] reads the trailer on open, then serves records by
//! index with a seek to `index * record_size`.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::{decode_record, decode_trailer};
use crate::error::CheckpointError;
use crate::types::{Record, Trailer, TRAILER_LEN};

/// Random-access reader over a complete checkpoint.
pub struct CheckpointReader<R: Read + Seek> {
    reader: R,
    trailer: Trailer,
    records: u64,
}

impl CheckpointReader<BufReader<File>> {
    /// Open a checkpoint file.
    pub fn open_path(path: &Path) -> Result<Self, CheckpointError> {
        Self::open(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> CheckpointReader<R> {
    /// Read and validate the trailer.
    pub fn open(mut reader: R) -> Result<Self, CheckpointError> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < TRAILER_LEN as u64 {
            return Err(CheckpointError::Truncated {
                detail: format!("{len} bytes is shorter than the trailer"),
            });
        }
        reader.seek(SeekFrom::Start(len - TRAILER_LEN as u64))?;
        let trailer = decode_trailer(&mut reader)?;
        let body = len - TRAILER_LEN as u64;
        if body % trailer.record_size != 0 {
            return Err(CheckpointError::RecordSizeMismatch {
                expected: (body / trailer.record_size + 1) * trailer.record_size,
                found: body,
            });
        }
        Ok(Self {
            reader,
            records: body / trailer.record_size,
            trailer,
        })
    }

    /// The global scalars.
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// Number of records in the file.
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Read record `index`.
    pub fn read_record(&mut self, index: u64) -> Result<Record, CheckpointError> {
        if index >= self.records {
            return Err(CheckpointError::Truncated {
                detail: format!("record {index} past the last record {}", self.records),
            });
        }
        self.reader
            .seek(SeekFrom::Start(index * self.trailer.record_size))?;
        decode_record(&mut self.reader, index, self.trailer.record_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordFlag, RecordHeader};
    use crate::writer::RecordWriter;
    use std::io::Cursor;

    fn header(flag: RecordFlag, children: [u64; 8], step: u64) -> RecordHeader {
        RecordHeader {
            flag,
            child_records: children,
            step_num: step,
            current_time: step as f64 * 0.5,
            rotational_time: 0.0,
        }
    }

    fn two_records() -> Vec<u8> {
        let mut w = RecordWriter::new(Vec::new(), 120).unwrap();
        w.write_record(&Record {
            header: header(RecordFlag::Leaf, [1; 8], 3),
            payload: vec![9; 10],
        })
        .unwrap();
        w.write_record(&Record {
            header: header(RecordFlag::Leaf, [2; 8], 4),
            payload: vec![8; 31],
        })
        .unwrap();
        w.finish(&Trailer {
            omega: 0.1,
            pivot: [1.0, 2.0, 3.0],
            record_size: 120,
        })
        .unwrap()
    }

    #[test]
    fn random_access() {
        let mut r = CheckpointReader::open(Cursor::new(two_records())).unwrap();
        assert_eq!(r.record_count(), 2);
        assert_eq!(r.trailer().pivot, [1.0, 2.0, 3.0]);
        let second = r.read_record(1).unwrap();
        assert_eq!(second.header.step_num, 4);
        assert_eq!(&second.payload[..31], &[8; 31][..]);
        let first = r.read_record(0).unwrap();
        assert_eq!(first.header.step_num, 3);
        assert!(r.read_record(2).is_err());
    }

    #[test]
    fn short_file_is_truncated() {
        let r = CheckpointReader::open(Cursor::new(vec![0u8; 10]));
        assert!(matches!(r, Err(CheckpointError::Truncated { .. })));
    }

    #[test]
    fn partial_record_detected() {
        let mut bytes = two_records();
        // Drop 5 bytes from the body, keeping the trailer intact.
        let trailer = bytes.split_off(bytes.len() - TRAILER_LEN);
        bytes.truncate(bytes.len() - 5);
        bytes.extend(trailer);
        assert!(matches!(
            CheckpointReader::open(Cursor::new(bytes)),
            Err(CheckpointError::RecordSizeMismatch { .. })
        ));
    }
}
