//! Same-level neighbor links.

use crate::id::NodeHandle;

/// What lies in one of a node's 26 neighbor directions.
///
/// The three cases are kept distinct: a node at the edge of the domain and a
/// node next to a coarser region behave differently during boundary
/// exchange (the latter may receive prolonged ghosts from its aunt).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Link {
    /// The neighbor location is outside the simulation domain.
    #[default]
    DomainEdge,
    /// Inside the domain, but no node exists at this level there; the
    /// region is covered by a coarser leaf.
    Coarser,
    /// A same-level node.
    Present(NodeHandle),
}

impl Link {
    /// The neighbor handle, if one exists.
    pub fn handle(&self) -> Option<NodeHandle> {
        match self {
            Link::Present(h) => Some(*h),
            _ => None,
        }
    }

    /// Whether this link resolves to a same-level node.
    pub fn is_present(&self) -> bool {
        matches!(self, Link::Present(_))
    }
}
