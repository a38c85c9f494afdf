//! Tree formation: parent, neighbor, aunt and niece wiring.
//!
//! `form_tree` runs top-down after every topology change. A refined node
//! derives each child's 26 neighbor links from its own links, then recurses.
//! A leaf asks each same-level face neighbor for its children on the shared
//! face; those become the leaf's nieces and record the leaf as their aunt.
//!
//! A node's own relations are published only after its whole subtree has
//! been formed. Aunts are the exception: they are written by the aunt's
//! `get_nieces` call and cleared by regrid scatter.

use std::sync::Arc;

use arbor_core::{
    Direction, Face, Link, NodeHandle, Octant, NCHILD, NDIRECTION, NFACE, NIECES_PER_FACE,
};
use arbor_runtime::{join_all, BoxFuture};
use smallvec::SmallVec;
use tracing::trace;

use crate::error::EngineError;
use crate::node::Node;

/// Where a child's neighbor in some direction lives, relative to the
/// child's parent.
enum ChildNeighbor {
    /// Another child of the same parent.
    Sibling(Octant),
    /// A child of the parent's neighbor in `parent_dir`.
    Cousin { parent_dir: Direction, octant: Octant },
}

/// Locate the neighbor of child `octant` in direction `dir`.
///
/// Works in the parent's doubled coordinates: the child sits at
/// `bit(axis)`, its neighbor at `bit + offset`. Shifting by 2 keeps the
/// value non-negative; `x / 2` then selects the parent-level cell (1 is the
/// parent itself) and `x % 2` the octant within it.
fn child_neighbor(octant: Octant, dir: Direction) -> ChildNeighbor {
    let offset = dir.offset();
    let mut parent_offset = [0i8; 3];
    let mut other = 0u8;
    for axis in 0..3 {
        let x = octant.bit(axis) as i8 + offset[axis] + 2;
        parent_offset[axis] = x / 2 - 1;
        other |= ((x % 2) as u8) << axis;
    }
    // Octant bits are 0..8 by construction.
    let octant = Octant::ALL[other as usize];
    match Direction::from_offset(parent_offset) {
        Ok(parent_dir) => ChildNeighbor::Cousin { parent_dir, octant },
        Err(_) => ChildNeighbor::Sibling(octant),
    }
}

impl Node {
    /// Rebuild relations for this node's subtree.
    pub(crate) fn form_tree(
        self: Arc<Self>,
        parent: Option<NodeHandle>,
        neighbors: [Link; NDIRECTION],
    ) -> BoxFuture<'static, Result<(), EngineError>> {
        Box::pin(async move {
            let mut nieces: [SmallVec<[NodeHandle; NIECES_PER_FACE]>; NFACE] = Default::default();

            if let Some(kids) = self.children() {
                let mut calls = Vec::with_capacity(NCHILD);
                for octant in Octant::ALL {
                    let links = self.child_links(octant, &kids, &neighbors)?;
                    let child = self.client(kids[octant.index()])?;
                    calls.push(child.form_tree(Some(self.handle), links)?);
                }
                join_all(calls).await?;
            } else {
                for face in Face::ALL {
                    if let Link::Present(h) = neighbors[face.to_direction().index()] {
                        nieces[face.index()] =
                            self.client(h)?.get_nieces(self.handle, face.opposite())?;
                    }
                }
            }

            let mut family = self.family();
            family.parent = parent;
            family.neighbors = neighbors;
            family.nieces = nieces;
            trace!(node = %self.handle, "formed");
            Ok(())
        })
    }

    /// Neighbor links of child `octant`, derived from this node's links.
    fn child_links(
        &self,
        octant: Octant,
        kids: &[NodeHandle; NCHILD],
        neighbors: &[Link; NDIRECTION],
    ) -> Result<[Link; NDIRECTION], EngineError> {
        let mut links = [Link::DomainEdge; NDIRECTION];
        for dir in Direction::ALL {
            links[dir.index()] = match child_neighbor(octant, dir) {
                ChildNeighbor::Sibling(o) => Link::Present(kids[o.index()]),
                ChildNeighbor::Cousin { parent_dir, octant } => {
                    match neighbors[parent_dir.index()] {
                        Link::Present(h) => match self.client(h)?.get_child_client(octant)? {
                            Some(cousin) => Link::Present(cousin),
                            None => Link::Coarser,
                        },
                        Link::Coarser => Link::Coarser,
                        Link::DomainEdge => Link::DomainEdge,
                    }
                }
            };
        }
        Ok(links)
    }

    /// This node's children along `face`, in niece order, after recording
    /// `asker` as their aunt across that face.
    pub(crate) fn get_nieces(
        &self,
        asker: NodeHandle,
        face: Face,
    ) -> Result<SmallVec<[NodeHandle; NIECES_PER_FACE]>, EngineError> {
        let Some(kids) = self.children() else {
            return Ok(SmallVec::new());
        };
        let mut out = SmallVec::new();
        for octant in face.child_octants() {
            let child = kids[octant.index()];
            self.client(child)?.set_aunt(asker, face)?;
            out.push(child);
        }
        Ok(out)
    }

    pub(crate) fn set_aunt(&self, aunt: NodeHandle, face: Face) {
        self.family().aunts[face.index()] = Some(aunt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::NodeLocation;

    /// Brute-force: compare against absolute coordinates.
    #[test]
    fn child_neighbor_matches_coordinates() {
        let parent = NodeLocation::new(2, [1, 2, 1]).unwrap();
        for octant in Octant::ALL {
            let child = parent.get_child(octant).unwrap();
            for dir in Direction::ALL {
                let Some(target) = child.neighbor(dir) else {
                    continue;
                };
                match child_neighbor(octant, dir) {
                    ChildNeighbor::Sibling(o) => {
                        assert_eq!(target, parent.get_child(o).unwrap());
                    }
                    ChildNeighbor::Cousin { parent_dir, octant } => {
                        let uncle = parent.neighbor(parent_dir).unwrap();
                        assert_eq!(target, uncle.get_child(octant).unwrap());
                    }
                }
            }
        }
    }

    #[test]
    fn interior_directions_stay_in_parent() {
        // Octant 0 looking +x+y+z sees octant 7, a sibling.
        let d = Direction::from_offset([1, 1, 1]).unwrap();
        assert!(matches!(
            child_neighbor(Octant::ALL[0], d),
            ChildNeighbor::Sibling(o) if o == Octant::ALL[7]
        ));
        // Octant 0 looking -x leaves the parent.
        let d = Direction::from_offset([-1, 0, 0]).unwrap();
        assert!(matches!(
            child_neighbor(Octant::ALL[0], d),
            ChildNeighbor::Cousin { octant, .. } if octant == Octant::ALL[1]
        ));
    }
}
