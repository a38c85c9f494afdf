//! Location-transparent call layer.
//!
//! A [`NodeClient`] pairs a [`NodeHandle`] with the cluster routing table.
//! Every entry point resolves the handle first; a handle that no longer
//! resolves is a stale-topology protocol violation and fails the call.
//!
//! Two kinds of entry point exist:
//!
//! - Deliveries (`recv_*`, `set_*`, topology helpers) run immediately on
//!   the caller's task and return once the value is in the target's
//!   mailbox.
//! - Tree operations (`form_tree`, `regrid_*`, `step`, `save`, `load`, ...)
//!   are spawned as tokio tasks and return a [`RemoteCall`] to join.

use std::sync::Arc;

use arbor_core::{
    Direction, Face, FieldClass, Link, NodeHandle, NodeLocation, Octant, OutputList, Real,
    NDIRECTION, NIECES_PER_FACE,
};
use arbor_runtime::{spawn, BoxFuture, Cluster, RpcKind};
use smallvec::SmallVec;
use tokio::task::JoinHandle;

use crate::error::EngineError;
use crate::node::Node;
use crate::persist::{LoadContext, LoadOutcome, SaveTarget};

/// A spawned tree operation on some node.
pub type RemoteCall<T> = JoinHandle<Result<T, EngineError>>;

/// Address of a node plus the means to reach it.
#[derive(Clone)]
pub struct NodeClient {
    handle: NodeHandle,
    cluster: Arc<Cluster<Node>>,
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodeClient").field(&self.handle).finish()
    }
}

impl NodeClient {
    /// A client for `handle`.
    pub fn new(handle: NodeHandle, cluster: Arc<Cluster<Node>>) -> Self {
        Self { handle, cluster }
    }

    /// The target handle.
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Resolve the target node.
    pub fn resolve(&self) -> Result<Arc<Node>, EngineError> {
        Ok(self.cluster.resolve(&self.handle)?)
    }

    fn spawn_call<T, F>(&self, f: F) -> Result<RemoteCall<T>, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Node>) -> BoxFuture<'static, Result<T, EngineError>> + Send + 'static,
    {
        let cluster = Arc::clone(&self.cluster);
        let handle = self.handle;
        Ok(spawn(async move {
            let node = cluster.resolve(&handle)?;
            f(node).await
        })?)
    }

    // ── Boundary deliveries ─────────────────────────────────────

    /// Deliver a ghost slab of `class` arriving from direction `dir`.
    pub fn recv_boundary(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        dir: Direction,
    ) -> Result<(), EngineError> {
        self.cluster.record(match class {
            FieldClass::Hydro => RpcKind::HydroBoundary,
            FieldClass::Radiation => RpcKind::RadBoundary,
        });
        self.resolve()?.recv_boundary(class, data, dir)
    }

    /// Deliver a hydro ghost slab arriving from direction `dir`.
    pub fn recv_hydro_boundary(&self, data: Vec<Real>, dir: Direction) -> Result<(), EngineError> {
        self.recv_boundary(FieldClass::Hydro, data, dir)
    }

    /// Deliver a radiation ghost slab arriving from direction `dir`.
    pub fn recv_rad_boundary(&self, data: Vec<Real>, dir: Direction) -> Result<(), EngineError> {
        self.recv_boundary(FieldClass::Radiation, data, dir)
    }

    /// Deliver a neighbor's gravity data arriving from direction `dir`.
    pub fn recv_gravity_boundary(
        &self,
        data: Vec<Real>,
        dir: Direction,
        is_monopole: bool,
    ) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::GravityBoundary);
        self.resolve()?.recv_gravity_boundary(data, dir, is_monopole)
    }

    /// Deliver a finer node's boundary slab for the target's `face`.
    /// `octant` is the sender's octant in its own parent.
    pub fn recv_niece_boundary(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::NieceBoundary);
        self.resolve()?.recv_niece_boundary(class, data, face, octant)
    }

    /// Hydro form of [`recv_niece_boundary`](Self::recv_niece_boundary).
    pub fn recv_hydro_niece_boundary(
        &self,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.recv_niece_boundary(FieldClass::Hydro, data, face, octant)
    }

    /// Deliver a finer node's flux correction for the target's `face`.
    pub fn recv_flux_correct(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.cluster.record(match class {
            FieldClass::Hydro => RpcKind::HydroFluxCorrect,
            FieldClass::Radiation => RpcKind::RadFluxCorrect,
        });
        self.resolve()?.recv_flux_correct(class, data, face, octant)
    }

    /// Deliver a hydro flux correction.
    pub fn recv_hydro_flux_correct(
        &self,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.recv_flux_correct(FieldClass::Hydro, data, face, octant)
    }

    /// Deliver a radiation flux correction.
    pub fn recv_rad_flux_correct(
        &self,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.recv_flux_correct(FieldClass::Radiation, data, face, octant)
    }

    /// Deliver a child's restricted interior.
    pub fn recv_children(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::Restriction);
        self.resolve()?.recv_children(class, data, octant)
    }

    /// Hydro form of [`recv_children`](Self::recv_children).
    pub fn recv_hydro_children(&self, data: Vec<Real>, octant: Octant) -> Result<(), EngineError> {
        self.recv_children(FieldClass::Hydro, data, octant)
    }

    /// Radiation form of [`recv_children`](Self::recv_children).
    pub fn recv_rad_children(&self, data: Vec<Real>, octant: Octant) -> Result<(), EngineError> {
        self.recv_children(FieldClass::Radiation, data, octant)
    }

    // ── Gravity ─────────────────────────────────────────────────

    /// Deliver a child's multipole moments.
    pub fn recv_gravity_multipoles(
        &self,
        data: Vec<Real>,
        octant: Octant,
    ) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::Multipole);
        self.resolve()?.recv_gravity_multipoles(data, octant)
    }

    /// Deliver the parent's expansion.
    pub fn recv_gravity_expansions(&self, data: Vec<Real>) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::Expansion);
        self.resolve()?.recv_gravity_expansions(data)
    }

    /// Compute gravity for the target's subtree.
    pub fn solve_gravity(&self) -> Result<RemoteCall<()>, EngineError> {
        self.spawn_call(|n| n.solve_gravity())
    }

    // ── Timestep ────────────────────────────────────────────────

    /// Deliver a child's (slot 0..8) or the node's own (slot 8) candidate.
    pub fn set_local_timestep(&self, slot: usize, dt: Real) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::LocalTimestep);
        self.resolve()?.set_local_timestep(slot, dt)
    }

    /// Broadcast the chosen timestep into the target's subtree.
    pub fn timestep_driver_descend(&self, dt: Real) -> Result<(), EngineError> {
        self.cluster.record(RpcKind::GlobalTimestep);
        self.resolve()?.timestep_driver_descend(dt)
    }

    // ── Topology ────────────────────────────────────────────────

    /// Rebuild relations for the target's subtree.
    pub fn form_tree(
        &self,
        parent: Option<NodeHandle>,
        neighbors: [Link; NDIRECTION],
    ) -> Result<RemoteCall<()>, EngineError> {
        self.spawn_call(move |n| n.form_tree(parent, neighbors))
    }

    /// Record `aunt` as the coarser neighbor across `face`.
    pub fn set_aunt(&self, aunt: NodeHandle, face: Face) -> Result<(), EngineError> {
        self.resolve()?.set_aunt(aunt, face);
        Ok(())
    }

    /// The target's children along `face`, registering `asker` as their
    /// aunt. Empty if the target is a leaf.
    pub fn get_nieces(
        &self,
        asker: NodeHandle,
        face: Face,
    ) -> Result<SmallVec<[NodeHandle; NIECES_PER_FACE]>, EngineError> {
        self.resolve()?.get_nieces(asker, face)
    }

    /// The target's child in `octant`, if refined.
    pub fn get_child_client(&self, octant: Octant) -> Result<Option<NodeHandle>, EngineError> {
        Ok(self
            .resolve()?
            .children()
            .map(|kids| kids[octant.index()]))
    }

    // ── Regrid ──────────────────────────────────────────────────

    /// Vote on refinement across the target's subtree.
    pub fn check_for_refinement(&self) -> Result<RemoteCall<()>, EngineError> {
        self.spawn_call(|n| n.check_for_refinement())
    }

    /// Ensure nodes exist at `locations` (2:1 balance).
    pub fn force_nodes_to_exist(&self, locations: Vec<NodeLocation>) -> Result<(), EngineError> {
        self.resolve()?.force_nodes_to_exist(locations)
    }

    /// Apply refine/derefine decisions and count the subtree.
    pub fn regrid_gather(&self, rebalance_only: bool) -> Result<RemoteCall<u64>, EngineError> {
        self.spawn_call(move |n| n.regrid_gather(rebalance_only))
    }

    /// Assign localities to the subtree starting at index `start`.
    pub fn regrid_scatter(&self, start: u64, total: u64) -> Result<RemoteCall<()>, EngineError> {
        self.spawn_call(move |n| n.regrid_scatter(start, total))
    }

    /// Initialize a new child's hydro fields from prolonged parent data.
    pub fn set_grid(&self, data: Vec<Real>, outflows: Vec<Real>) -> Result<(), EngineError> {
        self.resolve()?.set_grid(FieldClass::Hydro, &data, &outflows);
        Ok(())
    }

    /// Initialize a new child's radiation fields from prolonged parent data.
    pub fn set_rad_grid(&self, data: Vec<Real>) -> Result<(), EngineError> {
        self.resolve()?.set_grid(FieldClass::Radiation, &data, &[]);
        Ok(())
    }

    // ── Stepping ────────────────────────────────────────────────

    /// Advance the target's subtree by one global timestep.
    pub fn step(&self) -> Result<RemoteCall<Real>, EngineError> {
        self.spawn_call(|n| n.step())
    }

    // ── Persistence ─────────────────────────────────────────────

    /// Save the target's subtree starting at record `index`; resolves to
    /// the index after the subtree.
    pub fn save(&self, index: u64, target: Arc<SaveTarget>) -> Result<RemoteCall<u64>, EngineError> {
        self.spawn_call(move |n| n.save(index, target))
    }

    /// Load the target's subtree from record `index`.
    pub fn load(
        &self,
        index: u64,
        ctx: Arc<LoadContext>,
    ) -> Result<RemoteCall<LoadOutcome>, EngineError> {
        self.spawn_call(move |n| n.load(index, ctx))
    }

    /// Collect output chunks of the target's subtree.
    pub fn output(&self) -> Result<RemoteCall<OutputList>, EngineError> {
        self.spawn_call(|n| n.output())
    }
}
