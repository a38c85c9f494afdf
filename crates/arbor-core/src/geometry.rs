//! Octree geometry: octants, faces, and the 26 neighbor directions.
//!
//! All three types are thin index newtypes over `u8` so they can address
//! fixed-size arrays directly (`children[octant.index()]`,
//! `neighbors[direction.index()]`).
//!
//! # Conventions
//!
//! ```text
//! Octant  bit 0 = +x half, bit 1 = +y half, bit 2 = +z half
//! Face    index = 2 * axis + (1 if the face points in +axis)
//!         0:-x 1:+x 2:-y 3:+y 4:-z 5:+z
//! Direction  offsets (dx, dy, dz) in {-1, 0, 1}^3 minus the origin,
//!            ordered x-fastest; the origin slot is skipped.
//! ```

use std::fmt;

use crate::error::LocationError;

/// Number of children of a refined node.
pub const NCHILD: usize = 8;
/// Number of faces of a subgrid cube.
pub const NFACE: usize = 6;
/// Number of same-level neighbor directions (faces, edges, vertices).
pub const NDIRECTION: usize = 26;
/// Number of finer nodes covering one face of a coarser node.
pub const NIECES_PER_FACE: usize = 4;

/// One of the eight children of a refined node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Octant(u8);

impl Octant {
    /// All eight octants in index order.
    pub const ALL: [Octant; NCHILD] = [
        Octant(0),
        Octant(1),
        Octant(2),
        Octant(3),
        Octant(4),
        Octant(5),
        Octant(6),
        Octant(7),
    ];

    /// Build an octant from its index, rejecting values above 7.
    pub fn new(index: u8) -> Result<Self, LocationError> {
        if (index as usize) < NCHILD {
            Ok(Self(index))
        } else {
            Err(LocationError::InvalidOctant { index })
        }
    }

    /// Array index of this octant.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// 0 for the lower half along `axis`, 1 for the upper half.
    pub fn bit(self, axis: usize) -> u8 {
        (self.0 >> axis) & 1
    }

    /// Whether this child touches the given face of its parent.
    pub fn is_on_face(self, face: Face) -> bool {
        self.bit(face.axis()) == u8::from(face.is_positive())
    }
}

impl fmt::Display for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the six faces of a subgrid cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Face(u8);

impl Face {
    /// All six faces in index order.
    pub const ALL: [Face; NFACE] = [Face(0), Face(1), Face(2), Face(3), Face(4), Face(5)];

    /// Build a face from its index, rejecting values above 5.
    pub fn new(index: u8) -> Result<Self, LocationError> {
        if (index as usize) < NFACE {
            Ok(Self(index))
        } else {
            Err(LocationError::InvalidFace { index })
        }
    }

    /// Array index of this face.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Axis normal to this face (0 = x, 1 = y, 2 = z).
    pub fn axis(self) -> usize {
        (self.0 / 2) as usize
    }

    /// Whether the outward normal points along +axis.
    pub fn is_positive(self) -> bool {
        self.0 % 2 == 1
    }

    /// The face on the other side of the cube.
    pub fn opposite(self) -> Face {
        Face(self.0 ^ 1)
    }

    /// The neighbor direction this face looks into.
    pub fn to_direction(self) -> Direction {
        let mut offset = [0i8; 3];
        offset[self.axis()] = if self.is_positive() { 1 } else { -1 };
        Direction::from_raw_offset(offset)
    }

    /// The four child octants touching this face, in ascending octant order.
    ///
    /// This ordering is the niece ordering: niece `i` on a face is the
    /// neighbor's child at `child_octants(face.opposite())[i]`.
    pub fn child_octants(self) -> [Octant; NIECES_PER_FACE] {
        let mut out = [Octant(0); NIECES_PER_FACE];
        let mut n = 0;
        for octant in Octant::ALL {
            if octant.is_on_face(self) {
                out[n] = octant;
                n += 1;
            }
        }
        out
    }

    /// Position of `octant` within [`child_octants`](Self::child_octants),
    /// or `None` if the octant does not touch this face.
    pub fn niece_index(self, octant: Octant) -> Option<usize> {
        self.child_octants().iter().position(|&o| o == octant)
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_positive() { '+' } else { '-' };
        let axis = ['x', 'y', 'z'][self.axis()];
        write!(f, "{sign}{axis}")
    }
}

/// How a neighbor direction touches the cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectionKind {
    /// Shares a face (one non-zero offset component).
    Face,
    /// Shares an edge (two non-zero components).
    Edge,
    /// Shares a vertex (three non-zero components).
    Vertex,
}

/// One of the 26 same-level neighbor directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Direction(u8);

impl Direction {
    /// All 26 directions in index order.
    pub const ALL: [Direction; NDIRECTION] = {
        let mut out = [Direction(0); NDIRECTION];
        let mut i = 0;
        while i < NDIRECTION {
            out[i] = Direction(i as u8);
            i += 1;
        }
        out
    };

    /// Build a direction from its index, rejecting values above 25.
    pub fn new(index: u8) -> Result<Self, LocationError> {
        if (index as usize) < NDIRECTION {
            Ok(Self(index))
        } else {
            Err(LocationError::InvalidDirection { index })
        }
    }

    /// Build a direction from an offset triple. The zero offset is rejected,
    /// as is any component outside `-1..=1`.
    pub fn from_offset(offset: [i8; 3]) -> Result<Self, LocationError> {
        if offset == [0, 0, 0] || offset.iter().any(|c| !(-1..=1).contains(c)) {
            return Err(LocationError::InvalidOffset { offset });
        }
        Ok(Self::from_raw_offset(offset))
    }

    fn from_raw_offset(offset: [i8; 3]) -> Self {
        let raw = (offset[0] + 1) + 3 * (offset[1] + 1) + 9 * (offset[2] + 1);
        let raw = raw as u8;
        // Skip the centre slot (raw 13).
        Self(if raw > 13 { raw - 1 } else { raw })
    }

    /// Array index of this direction.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The `(dx, dy, dz)` offset of this direction.
    pub fn offset(self) -> [i8; 3] {
        let raw = (if self.0 >= 13 { self.0 + 1 } else { self.0 }) as i8;
        [raw % 3 - 1, (raw / 3) % 3 - 1, raw / 9 - 1]
    }

    /// The direction pointing back the other way.
    pub fn opposite(self) -> Direction {
        let [x, y, z] = self.offset();
        Self::from_raw_offset([-x, -y, -z])
    }

    /// Classify this direction as face, edge, or vertex adjacency.
    pub fn kind(self) -> DirectionKind {
        match self.offset().iter().filter(|c| **c != 0).count() {
            1 => DirectionKind::Face,
            2 => DirectionKind::Edge,
            _ => DirectionKind::Vertex,
        }
    }

    /// The face this direction crosses, if it is a face direction.
    pub fn to_face(self) -> Option<Face> {
        if self.kind() != DirectionKind::Face {
            return None;
        }
        let offset = self.offset();
        let axis = offset.iter().position(|c| *c != 0)?;
        Some(Face((2 * axis) as u8 + u8::from(offset[axis] > 0)))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.offset();
        write!(f, "({x},{y},{z})")
    }
}
