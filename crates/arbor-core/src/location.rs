//! Node identity within the octree.
//!
//! A [`NodeLocation`] is an immutable `(level, x, y, z)` key. Coordinates are
//! integer cell indices at the node's own level, so a level-`l` node lives in
//! `0..2^l` along each axis. The root is level 0 at `(0, 0, 0)`.
//!
//! [`NodeLocation::key`] packs a location into a single `u64` locational code:
//! a sentinel bit at position `3 * level` followed by the x/y/z coordinate
//! bits interleaved (Morton order). Keys of distinct locations are distinct
//! and the parent key is `key >> 3`.

use std::fmt;

use smallvec::SmallVec;

use crate::error::LocationError;
use crate::geometry::{Direction, Octant, NDIRECTION};

/// Deepest level representable by a 64-bit locational code.
pub const MAX_LEVEL: u8 = 21;

/// Position and depth of a node in the octree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeLocation {
    level: u8,
    coords: [u32; 3],
}

impl NodeLocation {
    /// The root location.
    pub const ROOT: NodeLocation = NodeLocation {
        level: 0,
        coords: [0, 0, 0],
    };

    /// Build a location, validating the level and that each coordinate lies
    /// inside `0..2^level`.
    pub fn new(level: u8, coords: [u32; 3]) -> Result<Self, LocationError> {
        if level > MAX_LEVEL {
            return Err(LocationError::LevelOverflow { level });
        }
        let extent = 1u32 << level;
        if coords.iter().any(|c| *c >= extent) {
            return Err(LocationError::CoordinatesOutOfRange { level, coords });
        }
        Ok(Self { level, coords })
    }

    /// Refinement depth (root = 0).
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Cell coordinates at this location's level.
    pub fn coords(&self) -> [u32; 3] {
        self.coords
    }

    /// Number of nodes per axis at this level.
    pub fn extent(&self) -> u32 {
        1 << self.level
    }

    /// Whether this is the root location.
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// The child location in the given octant.
    pub fn get_child(&self, octant: Octant) -> Result<Self, LocationError> {
        if self.level >= MAX_LEVEL {
            return Err(LocationError::LevelOverflow {
                level: self.level + 1,
            });
        }
        let mut coords = self.coords;
        for (axis, c) in coords.iter_mut().enumerate() {
            *c = 2 * *c + u32::from(octant.bit(axis));
        }
        Ok(Self {
            level: self.level + 1,
            coords,
        })
    }

    /// The parent location, or `None` for the root.
    pub fn get_parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        Some(Self {
            level: self.level - 1,
            coords: self.coords.map(|c| c / 2),
        })
    }

    /// Which octant of its parent this location occupies, or `None` for
    /// the root.
    pub fn octant(&self) -> Option<Octant> {
        if self.level == 0 {
            return None;
        }
        let bits = (self.coords[0] & 1) | ((self.coords[1] & 1) << 1) | ((self.coords[2] & 1) << 2);
        Octant::new(bits as u8).ok()
    }

    /// The same-level location one step in `direction`, or `None` if it
    /// falls outside the domain.
    pub fn neighbor(&self, direction: Direction) -> Option<Self> {
        let extent = i64::from(self.extent());
        let offset = direction.offset();
        let mut coords = [0u32; 3];
        for axis in 0..3 {
            let c = i64::from(self.coords[axis]) + i64::from(offset[axis]);
            if !(0..extent).contains(&c) {
                return None;
            }
            coords[axis] = c as u32;
        }
        Some(Self {
            level: self.level,
            coords,
        })
    }

    /// All in-domain same-level neighbor locations.
    pub fn neighbors(&self) -> SmallVec<[NodeLocation; NDIRECTION]> {
        Direction::ALL
            .iter()
            .filter_map(|d| self.neighbor(*d))
            .collect()
    }

    /// Whether `self` lies strictly below `ancestor` in the tree.
    pub fn is_descendant_of(&self, ancestor: &NodeLocation) -> bool {
        if self.level <= ancestor.level {
            return false;
        }
        let shift = self.level - ancestor.level;
        self.coords
            .iter()
            .zip(ancestor.coords.iter())
            .all(|(c, a)| c >> shift == *a)
    }

    /// Compact locational code for this location.
    pub fn key(&self) -> u64 {
        let mut key = 1u64;
        for bit in (0..self.level).rev() {
            for axis in (0..3).rev() {
                key = (key << 1) | u64::from((self.coords[axis] >> bit) & 1);
            }
        }
        key
    }

    /// Decode a locational code produced by [`key`](Self::key).
    pub fn from_key(key: u64) -> Result<Self, LocationError> {
        if key == 0 {
            return Err(LocationError::InvalidKey { key });
        }
        let sentinel = 63 - key.leading_zeros();
        if sentinel % 3 != 0 {
            return Err(LocationError::InvalidKey { key });
        }
        let level = (sentinel / 3) as u8;
        let mut coords = [0u32; 3];
        for bit in 0..level {
            for (axis, c) in coords.iter_mut().enumerate() {
                let b = (key >> (3 * u32::from(bit) + axis as u32)) & 1;
                *c |= (b as u32) << bit;
            }
        }
        Ok(Self { level, coords })
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.coords;
        write!(f, "L{}({x},{y},{z})", self.level)
    }
}
