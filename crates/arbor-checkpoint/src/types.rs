//! Data types of the checkpoint format.

use crate::error::CheckpointError;

/// Number of child slots in a record header.
pub const CHILD_SLOTS: usize = 8;

/// Byte length of a record header: flag, child indices, step, two times.
pub const HEADER_LEN: usize = 1 + 8 * CHILD_SLOTS + 8 + 8 + 8;

/// Byte length of the file trailer: omega, pivot, record size.
pub const TRAILER_LEN: usize = 8 + 3 * 8 + 8;

/// Whether a record describes a refined node or a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordFlag {
    /// The node has 8 children, stored in later records.
    Refined,
    /// The node has no children.
    Leaf,
}

impl RecordFlag {
    /// The on-disk byte.
    pub fn to_byte(self) -> u8 {
        match self {
            RecordFlag::Refined => b'1',
            RecordFlag::Leaf => b'0',
        }
    }

    /// Parse the on-disk byte. `record` is only used for error reporting.
    pub fn from_byte(byte: u8, record: u64) -> Result<Self, CheckpointError> {
        match byte {
            b'1' => Ok(RecordFlag::Refined),
            b'0' => Ok(RecordFlag::Leaf),
            _ => Err(CheckpointError::CorruptFlag { byte, record }),
        }
    }
}

/// Fixed-size prefix of every record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordHeader {
    /// Refined or leaf.
    pub flag: RecordFlag,
    /// Record index of each child's subtree. A leaf stores its successor
    /// index in every slot.
    pub child_records: [u64; CHILD_SLOTS],
    /// Steps taken by this node.
    pub step_num: u64,
    /// Simulation time of this node.
    pub current_time: f64,
    /// Rotating-frame time of this node.
    pub rotational_time: f64,
}

impl RecordHeader {
    /// Check that a refined record at `index` in a file of `total` records
    /// points at children stored after it, in increasing order. Leaves pass
    /// unconditionally.
    pub fn check_child_records(&self, index: u64, total: u64) -> Result<(), CheckpointError> {
        if self.flag == RecordFlag::Leaf {
            return Ok(());
        }
        let bad = |detail: String| CheckpointError::CorruptOffsets {
            record: index,
            detail,
        };
        if self.child_records[0] != index + 1 {
            return Err(bad(format!(
                "first child at {}, expected {}",
                self.child_records[0],
                index + 1
            )));
        }
        for (ci, pair) in self.child_records.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(bad(format!(
                    "child {} at {} does not follow child {ci} at {}",
                    ci + 1,
                    pair[1],
                    pair[0]
                )));
            }
        }
        let last = self.child_records[CHILD_SLOTS - 1];
        if last >= total {
            return Err(bad(format!("child {} at {last} past {total} records", CHILD_SLOTS - 1)));
        }
        Ok(())
    }
}

/// One node's record: header plus opaque subgrid payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Structural and clock data.
    pub header: RecordHeader,
    /// Encoded subgrid, without padding.
    pub payload: Vec<u8>,
}

/// Global scalars appended after the last record.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Trailer {
    /// Frame rotation rate.
    pub omega: f64,
    /// Rotation pivot.
    pub pivot: [f64; 3],
    /// Byte length of every record.
    pub record_size: u64,
}

/// Record size needed to hold subgrid payloads of up to `max_payload` bytes.
pub fn record_size_for(max_payload: usize) -> u64 {
    (HEADER_LEN + max_payload) as u64
}

/// Pre-order record indices of the children of the node stored at `index`.
///
/// `counts[i]` is the number of nodes in child `i`'s subtree, so child `i`
/// begins right after the node itself and the subtrees of children `0..i`.
pub fn child_record_indices(index: u64, counts: &[u64; CHILD_SLOTS]) -> [u64; CHILD_SLOTS] {
    let mut out = [0; CHILD_SLOTS];
    let mut next = index + 1;
    for (slot, count) in out.iter_mut().zip(counts.iter()) {
        *slot = next;
        next += count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lengths() {
        assert_eq!(HEADER_LEN, 89);
        assert_eq!(TRAILER_LEN, 40);
        assert_eq!(record_size_for(100), 189);
    }

    fn refined(child_records: [u64; CHILD_SLOTS]) -> RecordHeader {
        RecordHeader {
            flag: RecordFlag::Refined,
            child_records,
            step_num: 0,
            current_time: 0.0,
            rotational_time: 0.0,
        }
    }

    #[test]
    fn child_records_must_follow_the_parent() {
        let good = refined(child_record_indices(4, &[1, 9, 1, 1, 1, 1, 1, 1]));
        assert!(good.check_child_records(4, 21).is_ok());

        let mut shifted = good;
        shifted.child_records[1] += 9;
        assert!(matches!(
            shifted.check_child_records(4, 21),
            Err(CheckpointError::CorruptOffsets { record: 4, .. })
        ));

        let mut early = good;
        early.child_records[0] = 4;
        assert!(early.check_child_records(4, 21).is_err());

        assert!(good.check_child_records(4, 20).is_err());

        let leaf = RecordHeader {
            flag: RecordFlag::Leaf,
            ..refined([0; CHILD_SLOTS])
        };
        assert!(leaf.check_child_records(4, 5).is_ok());
    }

    #[test]
    fn flag_bytes() {
        assert_eq!(RecordFlag::from_byte(b'1', 0).unwrap(), RecordFlag::Refined);
        assert_eq!(RecordFlag::from_byte(b'0', 0).unwrap(), RecordFlag::Leaf);
        assert!(matches!(
            RecordFlag::from_byte(b'x', 7),
            Err(CheckpointError::CorruptFlag {
                byte: b'x',
                record: 7
            })
        ));
        for f in [RecordFlag::Refined, RecordFlag::Leaf] {
            assert_eq!(RecordFlag::from_byte(f.to_byte(), 0).unwrap(), f);
        }
    }

    #[test]
    fn child_indices_are_running_totals() {
        let counts = [1, 9, 1, 1, 1, 1, 1, 1];
        assert_eq!(
            child_record_indices(3, &counts),
            [4, 5, 14, 15, 16, 17, 18, 19]
        );
    }
}
