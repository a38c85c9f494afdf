//! Binary encode/decode for the checkpoint format.
//!
//! All integers are little-endian. Child indices and the record size are
//! stored as signed 64-bit values. Records are fixed-size: the payload is
//! zero-padded to `record_size - HEADER_LEN`.

use std::io::{Read, Write};

use crate::error::CheckpointError;
use crate::types::{
    Record, RecordFlag, RecordHeader, Trailer, CHILD_SLOTS, HEADER_LEN, TRAILER_LEN,
};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), CheckpointError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian i64.
pub fn write_i64_le(w: &mut dyn Write, v: i64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f64.
pub fn write_f64_le(w: &mut dyn Write, v: f64) -> Result<(), CheckpointError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, CheckpointError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a little-endian i64.
pub fn read_i64_le(r: &mut dyn Read) -> Result<i64, CheckpointError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Read a little-endian f64.
pub fn read_f64_le(r: &mut dyn Read) -> Result<f64, CheckpointError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn to_index(v: i64, record: u64) -> Result<u64, CheckpointError> {
    u64::try_from(v).map_err(|_| CheckpointError::Truncated {
        detail: format!("negative child index {v} in record {record}"),
    })
}

// ── Records ─────────────────────────────────────────────────────

/// Encode a record header.
pub fn encode_header(w: &mut dyn Write, h: &RecordHeader) -> Result<(), CheckpointError> {
    write_u8(w, h.flag.to_byte())?;
    for c in &h.child_records {
        write_i64_le(w, *c as i64)?;
    }
    write_i64_le(w, h.step_num as i64)?;
    write_f64_le(w, h.current_time)?;
    write_f64_le(w, h.rotational_time)?;
    Ok(())
}

/// Decode a record header. `record` is the index being read, for errors.
pub fn decode_header(r: &mut dyn Read, record: u64) -> Result<RecordHeader, CheckpointError> {
    let flag = RecordFlag::from_byte(read_u8(r)?, record)?;
    let mut child_records = [0u64; CHILD_SLOTS];
    for c in child_records.iter_mut() {
        *c = to_index(read_i64_le(r)?, record)?;
    }
    let step_num = to_index(read_i64_le(r)?, record)?;
    Ok(RecordHeader {
        flag,
        child_records,
        step_num,
        current_time: read_f64_le(r)?,
        rotational_time: read_f64_le(r)?,
    })
}

/// Encode a full fixed-size record, padding the payload with zeros.
pub fn encode_record(
    w: &mut dyn Write,
    record: &Record,
    record_size: u64,
) -> Result<(), CheckpointError> {
    let capacity = (record_size as usize).saturating_sub(HEADER_LEN);
    if record.payload.len() > capacity {
        return Err(CheckpointError::PayloadTooLarge {
            len: record.payload.len(),
            capacity,
        });
    }
    encode_header(w, &record.header)?;
    w.write_all(&record.payload)?;
    w.write_all(&vec![0u8; capacity - record.payload.len()])?;
    Ok(())
}

/// Decode one fixed-size record. The payload keeps its padding; subgrid
/// decoders tolerate trailing zeros.
pub fn decode_record(
    r: &mut dyn Read,
    record: u64,
    record_size: u64,
) -> Result<Record, CheckpointError> {
    let header = decode_header(r, record)?;
    let mut payload = vec![0u8; (record_size as usize).saturating_sub(HEADER_LEN)];
    r.read_exact(&mut payload)?;
    Ok(Record { header, payload })
}

// ── Trailer ─────────────────────────────────────────────────────

/// Encode the file trailer.
pub fn encode_trailer(w: &mut dyn Write, t: &Trailer) -> Result<(), CheckpointError> {
    write_f64_le(w, t.omega)?;
    for p in &t.pivot {
        write_f64_le(w, *p)?;
    }
    write_i64_le(w, t.record_size as i64)?;
    Ok(())
}

/// Decode and validate the file trailer.
pub fn decode_trailer(r: &mut dyn Read) -> Result<Trailer, CheckpointError> {
    let omega = read_f64_le(r)?;
    let mut pivot = [0.0; 3];
    for p in pivot.iter_mut() {
        *p = read_f64_le(r)?;
    }
    let size = read_i64_le(r)?;
    if size < HEADER_LEN as i64 {
        return Err(CheckpointError::InvalidRecordSize { size });
    }
    Ok(Trailer {
        omega,
        pivot,
        record_size: size as u64,
    })
}

/// Byte length of a complete checkpoint with `records` records.
pub fn file_len(records: u64, record_size: u64) -> u64 {
    records * record_size + TRAILER_LEN as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(next: u64) -> RecordHeader {
        RecordHeader {
            flag: RecordFlag::Leaf,
            child_records: [next; CHILD_SLOTS],
            step_num: 12,
            current_time: 0.25,
            rotational_time: 0.125,
        }
    }

    #[test]
    fn header_is_fixed_length() {
        let mut buf = Vec::new();
        encode_header(&mut buf, &leaf(3)).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(buf[0], b'0');
        assert_eq!(decode_header(&mut buf.as_slice(), 2).unwrap(), leaf(3));
    }

    #[test]
    fn record_is_padded() {
        let rec = Record {
            header: leaf(1),
            payload: vec![7, 7, 7],
        };
        let mut buf = Vec::new();
        encode_record(&mut buf, &rec, 100).unwrap();
        assert_eq!(buf.len(), 100);
        let back = decode_record(&mut buf.as_slice(), 0, 100).unwrap();
        assert_eq!(back.header, rec.header);
        assert_eq!(&back.payload[..3], &[7, 7, 7]);
        assert!(back.payload[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn oversized_payload_rejected() {
        let rec = Record {
            header: leaf(1),
            payload: vec![0; 20],
        };
        let err = encode_record(&mut Vec::new(), &rec, (HEADER_LEN + 10) as u64).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::PayloadTooLarge {
                len: 20,
                capacity: 10
            }
        ));
    }

    #[test]
    fn corrupt_flag_reports_record() {
        let mut buf = Vec::new();
        encode_header(&mut buf, &leaf(1)).unwrap();
        buf[0] = b'7';
        assert!(matches!(
            decode_header(&mut buf.as_slice(), 5),
            Err(CheckpointError::CorruptFlag {
                byte: b'7',
                record: 5
            })
        ));
    }

    #[test]
    fn trailer_rejects_small_record_size() {
        let t = Trailer {
            omega: 1.0,
            pivot: [0.0; 3],
            record_size: 4,
        };
        let mut buf = Vec::new();
        encode_trailer(&mut buf, &t).unwrap();
        assert_eq!(buf.len(), TRAILER_LEN);
        assert!(matches!(
            decode_trailer(&mut buf.as_slice()),
            Err(CheckpointError::InvalidRecordSize { size: 4 })
        ));
    }
}
