//! Record-at-a-time file writing, as done by the tree save.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use arbor_checkpoint::{
    append_record, child_record_indices, finish_file, CheckpointError, CheckpointReader, Record,
    RecordFlag, RecordHeader, Trailer, HEADER_LEN, TRAILER_LEN,
};
use proptest::prelude::*;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn scratch(name: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("arbor_ckpt_{}_{}_{name}.bin", std::process::id(), n))
}

fn leaf(index: u64, payload: Vec<u8>) -> Record {
    Record {
        header: RecordHeader {
            flag: RecordFlag::Leaf,
            child_records: [index + 1; 8],
            step_num: 0,
            current_time: 0.0,
            rotational_time: 0.0,
        },
        payload,
    }
}

// ── One-level tree ──────────────────────────────────────────────

#[test]
fn root_plus_eight_children() {
    let path = scratch("one_level");
    let record_size = (HEADER_LEN + 16) as u64;
    let root = Record {
        header: RecordHeader {
            flag: RecordFlag::Refined,
            child_records: child_record_indices(0, &[1; 8]),
            step_num: 7,
            current_time: 1.5,
            rotational_time: 0.5,
        },
        payload: vec![0xAA; 16],
    };
    append_record(&path, 0, record_size, &root).unwrap();
    for i in 1..=8u64 {
        append_record(&path, i, record_size, &leaf(i, vec![i as u8; 4])).unwrap();
    }
    let trailer = Trailer {
        omega: 0.25,
        pivot: [0.5, 0.5, 0.5],
        record_size,
    };
    finish_file(&path, 9, &trailer).unwrap();

    let len = std::fs::metadata(&path).unwrap().len();
    assert_eq!(len, 9 * record_size + TRAILER_LEN as u64);

    let mut reader = CheckpointReader::open_path(&path).unwrap();
    assert_eq!(reader.record_count(), 9);
    assert_eq!(*reader.trailer(), trailer);
    let r0 = reader.read_record(0).unwrap();
    assert_eq!(r0.header.flag, RecordFlag::Refined);
    assert_eq!(r0.header.child_records, [1, 2, 3, 4, 5, 6, 7, 8]);
    for (octant, idx) in r0.header.child_records.iter().enumerate() {
        let child = reader.read_record(*idx).unwrap();
        assert_eq!(child.header.flag, RecordFlag::Leaf);
        assert_eq!(&child.payload[..4], &[(octant + 1) as u8; 4]);
    }
    std::fs::remove_file(&path).unwrap();
}

// ── Misuse ──────────────────────────────────────────────────────

#[test]
fn out_of_order_append_rejected() {
    let path = scratch("out_of_order");
    let record_size = (HEADER_LEN + 8) as u64;
    append_record(&path, 0, record_size, &leaf(0, vec![])).unwrap();
    let err = append_record(&path, 2, record_size, &leaf(2, vec![])).unwrap_err();
    assert!(matches!(err, CheckpointError::RecordSizeMismatch { .. }));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn finish_checks_record_count() {
    let path = scratch("short");
    let record_size = (HEADER_LEN + 8) as u64;
    append_record(&path, 0, record_size, &leaf(0, vec![])).unwrap();
    let trailer = Trailer {
        record_size,
        ..Trailer::default()
    };
    assert!(finish_file(&path, 2, &trailer).is_err());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn corrupt_flag_surfaces_on_read() {
    let path = scratch("corrupt");
    let record_size = (HEADER_LEN + 8) as u64;
    append_record(&path, 0, record_size, &leaf(0, vec![1])).unwrap();
    finish_file(
        &path,
        1,
        &Trailer {
            record_size,
            ..Trailer::default()
        },
    )
    .unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = b'Z';
    std::fs::write(&path, bytes).unwrap();
    let mut reader = CheckpointReader::open_path(&path).unwrap();
    assert!(matches!(
        reader.read_record(0),
        Err(CheckpointError::CorruptFlag { byte: b'Z', record: 0 })
    ));
    std::fs::remove_file(&path).unwrap();
}

// ── Pre-order indices ───────────────────────────────────────────

proptest! {
    #[test]
    fn child_subtrees_are_disjoint_and_contiguous(
        index in 0u64..1000,
        counts in proptest::array::uniform8(1u64..50),
    ) {
        let kids = child_record_indices(index, &counts);
        prop_assert_eq!(kids[0], index + 1);
        for i in 1..8 {
            prop_assert_eq!(kids[i], kids[i - 1] + counts[i - 1]);
        }
        let end = kids[7] + counts[7];
        prop_assert_eq!(end, index + 1 + counts.iter().sum::<u64>());
    }
}
