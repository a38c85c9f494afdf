//! The unit of distribution.
//!
//! A [`Node`] owns one subgrid, knows its place in the tree through
//! handles, and exposes a fixed set of entry points (see
//! [`NodeClient`](crate::client::NodeClient)). Each node's mutable state is
//! split across small locks so that deliveries from different neighbors do
//! not contend:
//!
//! - `tree`: children and cached subtree sizes. Written only by regrid and
//!   load.
//! - `family`: parent, neighbor links, aunts, nieces. Written by
//!   `form_tree` (and `set_aunt` from a neighbor), cleared by scatter.
//! - `clock`: simulation time and step count.
//! - `grid`: the subgrid. Replaced wholesale by load and migration.
//!
//! No lock is ever held across an `.await` or across a call into another
//! node.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arbor_core::{
    Direction, Face, FieldClass, Link, NodeHandle, NodeLocation, Octant, ProtocolError, Real,
    RunConfig, Subgrid, SubgridFactory, NCHILD, NDIRECTION, NFACE, NIECES_PER_FACE,
};
use arbor_runtime::sync::lock;
use arbor_runtime::{AlreadySet, Channel, ChannelStats, Cluster};
use smallvec::SmallVec;

use crate::client::NodeClient;

/// Children and cached subtree sizes.
///
/// `children` is all-or-nothing: a node is a leaf or has exactly 8
/// children.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct TreeState {
    pub children: Option<[NodeHandle; NCHILD]>,
    pub child_descendant_count: [u64; NCHILD],
}

/// Handles to related nodes, valid between two `form_tree` passes.
#[derive(Clone, Debug)]
pub(crate) struct Family {
    pub parent: Option<NodeHandle>,
    pub neighbors: [Link; NDIRECTION],
    pub aunts: [Option<NodeHandle>; NFACE],
    pub nieces: [SmallVec<[NodeHandle; NIECES_PER_FACE]>; NFACE],
}

impl Default for Family {
    fn default() -> Self {
        Self {
            parent: None,
            neighbors: [Link::DomainEdge; NDIRECTION],
            aunts: [None; NFACE],
            nieces: Default::default(),
        }
    }
}

/// Simulation clock of one node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Clock {
    /// Simulation time.
    pub current_time: Real,
    /// Time in the rotating frame.
    pub rotational_time: Real,
    /// Steps taken.
    pub step_num: u64,
}

/// A neighbor's gravity payload.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GravityBoundary {
    pub data: Vec<Real>,
    pub is_monopole: bool,
}

type Slab = Vec<Real>;

fn channels<T, const N: usize>() -> [Channel<T>; N] {
    std::array::from_fn(|_| Channel::new())
}

fn face_channels<T>() -> [[Channel<T>; NIECES_PER_FACE]; NFACE] {
    std::array::from_fn(|_| channels())
}

/// Every inbound mailbox of a node.
pub(crate) struct NodeChannels {
    pub sibling_hydro: [Channel<Slab>; NDIRECTION],
    pub sibling_rad: [Channel<Slab>; NDIRECTION],
    pub neighbor_gravity: [Channel<GravityBoundary>; NDIRECTION],
    pub child_multipoles: [Channel<Slab>; NCHILD],
    pub parent_expansion: Channel<Slab>,
    pub child_hydro: [Channel<Slab>; NCHILD],
    pub child_rad: [Channel<Slab>; NCHILD],
    pub niece_hydro: [[Channel<Slab>; NIECES_PER_FACE]; NFACE],
    pub niece_rad: [[Channel<Slab>; NIECES_PER_FACE]; NFACE],
    pub niece_hydro_flux: [[Channel<Slab>; NIECES_PER_FACE]; NFACE],
    pub niece_rad_flux: [[Channel<Slab>; NIECES_PER_FACE]; NFACE],
    /// Slots 0..8 are children, slot 8 is the node itself.
    pub local_timestep: [Channel<Real>; NCHILD + 1],
    pub global_timestep: Channel<Real>,
}

/// Index of a node's own candidate in `local_timestep`.
pub(crate) const SELF_SLOT: usize = NCHILD;

impl NodeChannels {
    fn new() -> Self {
        Self {
            sibling_hydro: channels(),
            sibling_rad: channels(),
            neighbor_gravity: channels(),
            child_multipoles: channels(),
            parent_expansion: Channel::new(),
            child_hydro: channels(),
            child_rad: channels(),
            niece_hydro: face_channels(),
            niece_rad: face_channels(),
            niece_hydro_flux: face_channels(),
            niece_rad_flux: face_channels(),
            local_timestep: channels(),
            global_timestep: Channel::new(),
        }
    }

    pub fn sibling(&self, class: FieldClass) -> &[Channel<Slab>; NDIRECTION] {
        match class {
            FieldClass::Hydro => &self.sibling_hydro,
            FieldClass::Radiation => &self.sibling_rad,
        }
    }

    pub fn children(&self, class: FieldClass) -> &[Channel<Slab>; NCHILD] {
        match class {
            FieldClass::Hydro => &self.child_hydro,
            FieldClass::Radiation => &self.child_rad,
        }
    }

    pub fn nieces(&self, class: FieldClass) -> &[[Channel<Slab>; NIECES_PER_FACE]; NFACE] {
        match class {
            FieldClass::Hydro => &self.niece_hydro,
            FieldClass::Radiation => &self.niece_rad,
        }
    }

    pub fn niece_flux(&self, class: FieldClass) -> &[[Channel<Slab>; NIECES_PER_FACE]; NFACE] {
        match class {
            FieldClass::Hydro => &self.niece_hydro_flux,
            FieldClass::Radiation => &self.niece_rad_flux,
        }
    }
}

/// One octree node hosted on a locality.
pub struct Node {
    pub(crate) handle: NodeHandle,
    pub(crate) config: Arc<RunConfig>,
    pub(crate) cluster: Weak<Cluster<Node>>,
    pub(crate) factory: Arc<dyn SubgridFactory>,
    pub(crate) refinement_flag: AtomicI32,
    pub(crate) tree: Mutex<TreeState>,
    pub(crate) family: Mutex<Family>,
    pub(crate) clock: Mutex<Clock>,
    pub(crate) grid: Mutex<Box<dyn Subgrid>>,
    pub(crate) channels: NodeChannels,
}

// Compile-time assertion: nodes are shared across tokio worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Node>();
};

/// Everything needed to construct a node, apart from its handle.
pub(crate) struct NodeSeed {
    pub config: Arc<RunConfig>,
    pub cluster: Weak<Cluster<Node>>,
    pub factory: Arc<dyn SubgridFactory>,
    pub grid: Box<dyn Subgrid>,
    pub tree: TreeState,
    pub clock: Clock,
}

impl Node {
    pub(crate) fn from_seed(handle: NodeHandle, seed: NodeSeed) -> Self {
        Self {
            handle,
            config: seed.config,
            cluster: seed.cluster,
            factory: seed.factory,
            refinement_flag: AtomicI32::new(0),
            tree: Mutex::new(seed.tree),
            family: Mutex::new(Family::default()),
            clock: Mutex::new(seed.clock),
            grid: Mutex::new(seed.grid),
            channels: NodeChannels::new(),
        }
    }

    /// A seed sharing this node's configuration, cluster and factory.
    pub(crate) fn seed(&self, grid: Box<dyn Subgrid>, tree: TreeState, clock: Clock) -> NodeSeed {
        NodeSeed {
            config: Arc::clone(&self.config),
            cluster: Weak::clone(&self.cluster),
            factory: Arc::clone(&self.factory),
            grid,
            tree,
            clock,
        }
    }

    /// This node's handle.
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// This node's octree location.
    pub fn location(&self) -> NodeLocation {
        self.handle.location
    }

    /// Which octant of its parent this node is, `None` at the root.
    pub fn octant(&self) -> Option<Octant> {
        self.handle.location.octant()
    }

    /// Whether the node has children.
    pub fn is_refined(&self) -> bool {
        lock(&self.tree).children.is_some()
    }

    /// Handles of the children, if refined.
    pub fn children(&self) -> Option<[NodeHandle; NCHILD]> {
        lock(&self.tree).children
    }

    /// Cached subtree sizes of the children.
    pub fn child_descendant_count(&self) -> [u64; NCHILD] {
        lock(&self.tree).child_descendant_count
    }

    /// Pending refinement votes.
    pub fn refinement_flag(&self) -> i32 {
        self.refinement_flag.load(Ordering::Acquire)
    }

    /// Current clock.
    pub fn clock(&self) -> Clock {
        *lock(&self.clock)
    }

    /// Parent handle as of the last `form_tree`.
    pub fn parent(&self) -> Option<NodeHandle> {
        lock(&self.family).parent
    }

    /// Neighbor links as of the last `form_tree`.
    pub fn neighbors(&self) -> [Link; NDIRECTION] {
        lock(&self.family).neighbors
    }

    /// Neighbor link in one direction.
    pub fn neighbor(&self, dir: Direction) -> Link {
        lock(&self.family).neighbors[dir.index()]
    }

    /// Aunt across `face`, if any.
    pub fn aunt(&self, face: Face) -> Option<NodeHandle> {
        lock(&self.family).aunts[face.index()]
    }

    /// Nieces across `face`: empty or four handles.
    pub fn nieces(&self, face: Face) -> SmallVec<[NodeHandle; NIECES_PER_FACE]> {
        lock(&self.family).nieces[face.index()].clone()
    }

    /// Run `f` with the subgrid locked.
    pub fn with_grid<R>(&self, f: impl FnOnce(&mut dyn Subgrid) -> R) -> R {
        let mut grid = lock(&self.grid);
        f(grid.as_mut())
    }

    /// Set/get counts of the boundary mailbox facing `dir`.
    pub fn boundary_channel_stats(&self, class: FieldClass, dir: Direction) -> ChannelStats {
        self.channels.sibling(class)[dir.index()].stats()
    }

    /// Set/get counts of the niece mailboxes on `face`, in niece order.
    pub fn niece_channel_stats(&self, class: FieldClass, face: Face) -> [ChannelStats; NIECES_PER_FACE] {
        std::array::from_fn(|i| self.channels.nieces(class)[face.index()][i].stats())
    }

    pub(crate) fn grid(&self) -> MutexGuard<'_, Box<dyn Subgrid>> {
        lock(&self.grid)
    }

    pub(crate) fn family(&self) -> MutexGuard<'_, Family> {
        lock(&self.family)
    }

    pub(crate) fn cluster(&self) -> Result<Arc<Cluster<Node>>, ProtocolError> {
        self.cluster.upgrade().ok_or(ProtocolError::RuntimeShutDown)
    }

    pub(crate) fn client(&self, handle: NodeHandle) -> Result<NodeClient, ProtocolError> {
        Ok(NodeClient::new(handle, self.cluster()?))
    }

    /// Store a value in one of this node's channels, turning a double
    /// delivery into a protocol error.
    pub(crate) fn deliver<T>(
        &self,
        channel: &Channel<T>,
        value: T,
        label: impl FnOnce() -> String,
    ) -> Result<(), ProtocolError> {
        channel
            .set(value)
            .map_err(|AlreadySet(_)| ProtocolError::ChannelAlreadySet {
                channel: label(),
                node: self.handle,
            })
    }

    /// Forget every relation. Run by scatter before the tree is reformed.
    pub(crate) fn clear_family(&self) {
        *self.family() = Family::default();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("handle", &self.handle)
            .field("refined", &self.is_refined())
            .field("refinement_flag", &self.refinement_flag())
            .finish()
    }
}
