//! Location-transparent routing table.
//!
//! A [`Cluster`] is the set of localities taking part in a run. Each
//! [`Locality`] keeps a registry of the nodes it hosts, keyed by
//! [`NodeLocation`] and guarded by the node's [`Incarnation`]. Every
//! cross-node reference is a [`NodeHandle`] resolved through this table, so
//! the ownership graph has no cycles: the registry owns the nodes, and
//! nodes only hold handles to each other.
//!
//! A handle stops resolving as soon as its node is evicted (dropped or
//! migrated). Resolving it afterwards is a protocol violation reported as
//! [`ProtocolError::StaleHandle`].

use std::sync::{Arc, RwLock};

use arbor_core::{Incarnation, LocalityId, NodeHandle, NodeLocation, ProtocolError};
use indexmap::IndexMap;
use tracing::trace;

use crate::counters::{RpcCounters, RpcKind};
use crate::sync::{read, write};

/// Per-locality global scalars restored from a checkpoint trailer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameState {
    /// Frame rotation rate.
    pub omega: f64,
    /// Rotation pivot.
    pub pivot: [f64; 3],
    /// Checkpoint record size in bytes, once known.
    pub record_size: Option<u64>,
}

/// One worker process's node registry.
pub struct Locality<N> {
    id: LocalityId,
    nodes: RwLock<IndexMap<NodeLocation, (Incarnation, Arc<N>)>>,
    frame: RwLock<FrameState>,
}

impl<N> Locality<N> {
    fn new(id: LocalityId) -> Self {
        Self {
            id,
            nodes: RwLock::new(IndexMap::new()),
            frame: RwLock::new(FrameState::default()),
        }
    }

    /// This locality's id.
    pub fn id(&self) -> LocalityId {
        self.id
    }

    /// Number of nodes hosted here.
    pub fn len(&self) -> usize {
        read(&self.nodes).len()
    }

    /// Whether no nodes are hosted here.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every hosted node, in registration order.
    pub fn handles(&self) -> Vec<NodeHandle> {
        read(&self.nodes)
            .iter()
            .map(|(location, (incarnation, _))| NodeHandle {
                locality: self.id,
                location: *location,
                incarnation: *incarnation,
            })
            .collect()
    }

    /// Current frame state.
    pub fn frame(&self) -> FrameState {
        *read(&self.frame)
    }
}

/// All localities of a run plus shared call counters.
pub struct Cluster<N> {
    localities: Vec<Locality<N>>,
    counters: RpcCounters,
}

// Compile-time assertion: a cluster of Send + Sync nodes is shareable.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Cluster<()>>();
};

impl<N> Cluster<N> {
    /// A cluster with `localities` empty localities.
    pub fn new(localities: u32) -> Self {
        Self {
            localities: (0..localities.max(1))
                .map(|i| Locality::new(LocalityId(i)))
                .collect(),
            counters: RpcCounters::default(),
        }
    }

    /// Number of localities.
    pub fn num_localities(&self) -> u32 {
        self.localities.len() as u32
    }

    /// Look up a locality.
    pub fn locality(&self, id: LocalityId) -> Result<&Locality<N>, ProtocolError> {
        self.localities
            .get(id.index())
            .ok_or(ProtocolError::UnknownLocality { locality: id.0 })
    }

    /// Every locality, in id order.
    pub fn localities(&self) -> impl Iterator<Item = &Locality<N>> {
        self.localities.iter()
    }

    /// Create and register a node at `location` on `locality`.
    ///
    /// `build` receives the new node's handle. Registering a second node at
    /// an occupied location on the same locality is rejected.
    pub fn spawn<F>(
        &self,
        locality: LocalityId,
        location: NodeLocation,
        build: F,
    ) -> Result<(NodeHandle, Arc<N>), ProtocolError>
    where
        F: FnOnce(NodeHandle) -> N,
    {
        let loc = self.locality(locality)?;
        let handle = NodeHandle {
            locality,
            location,
            incarnation: Incarnation::next(),
        };
        let mut nodes = write(&loc.nodes);
        if nodes.contains_key(&location) {
            return Err(ProtocolError::InconsistentTopology {
                reason: format!("{location} already hosted on locality {locality}"),
            });
        }
        let node = Arc::new(build(handle));
        nodes.insert(location, (handle.incarnation, Arc::clone(&node)));
        trace!(%handle, "registered node");
        Ok((handle, node))
    }

    /// Resolve a handle to its node.
    pub fn resolve(&self, handle: &NodeHandle) -> Result<Arc<N>, ProtocolError> {
        let loc = self.locality(handle.locality)?;
        match read(&loc.nodes).get(&handle.location) {
            Some((incarnation, node)) if *incarnation == handle.incarnation => {
                Ok(Arc::clone(node))
            }
            _ => Err(ProtocolError::StaleHandle { handle: *handle }),
        }
    }

    /// Whether a handle still resolves.
    pub fn is_live(&self, handle: &NodeHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Remove a node from its locality's registry, returning it.
    pub fn evict(&self, handle: &NodeHandle) -> Result<Arc<N>, ProtocolError> {
        let loc = self.locality(handle.locality)?;
        let mut nodes = write(&loc.nodes);
        match nodes.get(&handle.location) {
            Some((incarnation, _)) if *incarnation == handle.incarnation => {}
            _ => return Err(ProtocolError::StaleHandle { handle: *handle }),
        }
        let (_, node) = nodes
            .shift_remove(&handle.location)
            .ok_or(ProtocolError::StaleHandle { handle: *handle })?;
        trace!(%handle, "evicted node");
        Ok(node)
    }

    /// Total nodes across all localities.
    pub fn node_count(&self) -> usize {
        self.localities.iter().map(Locality::len).sum()
    }

    /// Node count per locality.
    pub fn nodes_per_locality(&self) -> IndexMap<LocalityId, usize> {
        self.localities.iter().map(|l| (l.id, l.len())).collect()
    }

    /// Install the same frame state on every locality.
    pub fn broadcast_frame(&self, frame: FrameState) {
        for loc in &self.localities {
            *write(&loc.frame) = frame;
        }
    }

    /// Frame state of one locality.
    pub fn frame(&self, id: LocalityId) -> Result<FrameState, ProtocolError> {
        Ok(self.locality(id)?.frame())
    }

    /// Call counters shared by every node.
    pub fn counters(&self) -> &RpcCounters {
        &self.counters
    }

    /// Count one inter-node call.
    pub fn record(&self, kind: RpcKind) {
        self.counters.record(kind);
    }
}
