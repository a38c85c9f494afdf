//! Strongly-typed identifiers and node handles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::location::NodeLocation;

/// Identifies a worker process ("locality") hosting a subset of nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalityId(pub u32);

impl LocalityId {
    /// Array index of this locality.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Locality that owns position `index` of `total` under a balanced
    /// contiguous split across `localities` workers.
    pub fn for_index(index: u64, total: u64, localities: u32) -> Self {
        if total == 0 {
            return Self(0);
        }
        let id = (u128::from(index) * u128::from(localities) / u128::from(total)) as u32;
        Self(id.min(localities.saturating_sub(1)))
    }
}

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LocalityId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

static INCARNATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a node.
///
/// Allocated from a monotonic counter. A node created at the same location
/// after its predecessor was dropped or migrated receives a new incarnation,
/// so handles to the predecessor never resolve to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Incarnation(u64);

impl Incarnation {
    /// Allocate a fresh incarnation. Thread-safe.
    pub fn next() -> Self {
        Self(INCARNATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Incarnation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Logical address of a node: where it lives and which instance it is.
///
/// Handles are plain values. They never own the node; resolving one goes
/// through the locality's routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    /// Hosting locality.
    pub locality: LocalityId,
    /// Octree position.
    pub location: NodeLocation,
    /// Instance identity.
    pub incarnation: Incarnation,
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}{}", self.location, self.locality, self.incarnation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incarnations_are_unique() {
        let a = Incarnation::next();
        let b = Incarnation::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn locality_split_is_contiguous_and_bounded() {
        let total = 73;
        let mut prev = 0;
        for i in 0..total {
            let l = LocalityId::for_index(i, total, 4);
            assert!(l.0 < 4);
            assert!(l.0 >= prev);
            prev = l.0;
        }
        assert_eq!(LocalityId::for_index(0, total, 4), LocalityId(0));
        assert_eq!(LocalityId::for_index(72, total, 4), LocalityId(3));
        assert_eq!(LocalityId::for_index(5, 0, 4), LocalityId(0));
    }

    #[test]
    fn handle_display() {
        let h = NodeHandle {
            locality: LocalityId(2),
            location: NodeLocation::ROOT,
            incarnation: Incarnation(7),
        };
        assert_eq!(h.to_string(), "L0(0,0,0)@2#7");
    }
}
