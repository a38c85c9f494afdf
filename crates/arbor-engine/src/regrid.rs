//! Regrid coordinator: refinement votes, gather, scatter and migration.
//!
//! ```text
//! check_for_refinement   votes + 2:1 balance (force_nodes_to_exist)
//! regrid_gather          refine / derefine, count subtrees bottom-up
//! regrid_scatter         assign localities top-down, migrate, clear relations
//! ```
//!
//! Gather is the only phase that changes tree shape. After scatter every
//! node has forgotten its relations; the caller must run `form_tree`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use arbor_core::{
    FieldClass, LocalityId, NodeHandle, NodeLocation, Octant, ProlongRegion, ProtocolError, Real,
    NCHILD,
};
use arbor_runtime::sync::lock;
use arbor_runtime::{join_all, join_or_abort, BoxFuture, Cluster, RpcKind};
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::node::{Node, TreeState};

/// The ancestor of `loc` at `level`, or `loc` itself at its own level.
fn ancestor_at(loc: NodeLocation, level: u8) -> Option<NodeLocation> {
    let mut cur = loc;
    while cur.level() > level {
        cur = cur.get_parent()?;
    }
    (cur.level() == level).then_some(cur)
}

impl Node {
    // ── Refinement votes ────────────────────────────────────────

    /// Collect refinement votes over this subtree.
    pub(crate) fn check_for_refinement(
        self: Arc<Self>,
    ) -> BoxFuture<'static, Result<(), EngineError>> {
        Box::pin(async move {
            let mut calls = Vec::new();
            if let Some(kids) = self.children() {
                for child in kids {
                    calls.push(self.client(child)?.check_for_refinement()?);
                }
            }
            join_or_abort(std::future::ready(self.vote()), calls).await?;
            Ok(())
        })
    }

    fn vote(&self) -> Result<(), EngineError> {
        let level = self.location().level();
        if level >= self.config.max_level || !self.grid().wants_refinement(level) {
            return Ok(());
        }
        let mut up = Vec::new();
        self.flag_refinement(&mut up);
        self.forward_up(up)
    }

    /// Add one refinement vote. The first vote on a non-root node queues
    /// its same-level neighbors so that they exist after regrid.
    fn flag_refinement(&self, up: &mut Vec<NodeLocation>) {
        let prev = self.refinement_flag.fetch_add(1, Ordering::AcqRel);
        if prev == 0 && !self.location().is_root() {
            up.extend(self.location().neighbors());
        }
    }

    fn forward_up(&self, up: Vec<NodeLocation>) -> Result<(), EngineError> {
        if up.is_empty() {
            return Ok(());
        }
        match self.parent() {
            Some(parent) => self.client(parent)?.force_nodes_to_exist(up),
            None => Ok(()),
        }
    }

    /// Make sure every location in `locations` will exist after the next
    /// gather, by flagging the node that must be refined to contain it.
    ///
    /// Locations inside this node's cell flag this node and are routed on
    /// to the child containing them; anything else goes to the parent.
    pub(crate) fn force_nodes_to_exist(
        &self,
        locations: Vec<NodeLocation>,
    ) -> Result<(), EngineError> {
        let here = self.location();
        let kids = self.children();
        let mut up = Vec::new();
        let mut down: [Vec<NodeLocation>; NCHILD] = Default::default();

        for loc in locations {
            if !loc.is_descendant_of(&here) {
                up.push(loc);
                continue;
            }
            self.flag_refinement(&mut up);
            if loc.level() <= here.level() + 1 {
                continue;
            }
            // A leaf only needs the flag; deeper nodes appear on later passes.
            if kids.is_some() {
                if let Some(octant) = ancestor_at(loc, here.level() + 1).and_then(|a| a.octant()) {
                    down[octant.index()].push(loc);
                }
            }
        }

        if let Some(kids) = kids {
            for (child, locs) in kids.into_iter().zip(down) {
                if !locs.is_empty() {
                    self.client(child)?.force_nodes_to_exist(locs)?;
                }
            }
        }
        self.forward_up(up)
    }

    // ── Gather ──────────────────────────────────────────────────

    /// Apply this pass's refine/derefine decisions and return the number
    /// of nodes in the resulting subtree.
    pub(crate) fn regrid_gather(
        self: Arc<Self>,
        rebalance_only: bool,
    ) -> BoxFuture<'static, Result<u64, EngineError>> {
        Box::pin(async move {
            let flagged = self.refinement_flag() != 0;
            match self.children() {
                Some(kids) if !flagged && !rebalance_only => {
                    let removed = self.derefine(kids)?;
                    debug!(node = %self.handle, removed, "derefined");
                    Ok(1)
                }
                Some(kids) => {
                    let mut calls = Vec::with_capacity(NCHILD);
                    for child in kids {
                        calls.push(self.client(child)?.regrid_gather(rebalance_only)?);
                    }
                    let counts = join_all(calls).await?;
                    let mut tree = lock(&self.tree);
                    for (slot, count) in tree.child_descendant_count.iter_mut().zip(&counts) {
                        *slot = *count;
                    }
                    Ok(1 + counts.iter().sum::<u64>())
                }
                None if flagged && !rebalance_only => {
                    self.refine()?;
                    debug!(node = %self.handle, "refined");
                    Ok(1 + NCHILD as u64)
                }
                None => Ok(1),
            }
        })
    }

    /// Drop every descendant. Returns the number of nodes removed.
    fn derefine(&self, kids: [NodeHandle; NCHILD]) -> Result<usize, EngineError> {
        let cluster = self.cluster()?;
        let mut removed = 0;
        for child in kids {
            removed += drop_subtree(&cluster, child)?;
        }
        *lock(&self.tree) = TreeState::default();
        self.grid().set_leaf(true);
        Ok(removed)
    }

    /// Create 8 children on this node's locality.
    fn refine(&self) -> Result<(), EngineError> {
        let cluster = self.cluster()?;
        let clock = self.clock();
        let mut handles = Vec::with_capacity(NCHILD);
        for octant in Octant::ALL {
            let location = self.location().get_child(octant)?;
            let seed = self.seed(self.factory.create(&location), TreeState::default(), clock);
            let (handle, _) =
                cluster.spawn(self.handle.locality, location, |h| Node::from_seed(h, seed))?;
            handles.push(handle);
        }
        let kids: [NodeHandle; NCHILD] =
            handles
                .try_into()
                .map_err(|_| ProtocolError::InconsistentTopology {
                    reason: format!("{} refined into fewer than 8 children", self.handle),
                })?;

        if clock.current_time > 0.0 {
            self.prolong_into(&kids)?;
        }

        *lock(&self.tree) = TreeState {
            children: Some(kids),
            child_descendant_count: [1; NCHILD],
        };
        self.grid().set_leaf(false);
        Ok(())
    }

    /// Initialize new children from this node's data, hydro always and
    /// radiation when it is on. Only the first child inherits the hydro
    /// outflow tally, so the total is not counted eight times.
    fn prolong_into(&self, kids: &[NodeHandle; NCHILD]) -> Result<(), EngineError> {
        let width = self.config.subgrid_width;
        let outflows = self.grid().outflows();
        let classes = std::iter::once(FieldClass::Hydro)
            .chain(self.config.radiation_on.then_some(FieldClass::Radiation));
        for class in classes {
            let ghost = self.config.ghost_width(class);
            for (octant, child) in Octant::ALL.into_iter().zip(kids) {
                let region = ProlongRegion::for_octant(octant, ghost, width);
                let data = self.grid().prolong(class, &region);
                let client = self.client(*child)?;
                match class {
                    FieldClass::Hydro if octant.index() == 0 => {
                        client.set_grid(data, outflows.clone())?
                    }
                    FieldClass::Hydro => client.set_grid(data, vec![0.0; outflows.len()])?,
                    FieldClass::Radiation => client.set_rad_grid(data)?,
                }
            }
        }
        Ok(())
    }

    pub(crate) fn set_grid(&self, class: FieldClass, data: &[Real], outflows: &[Real]) {
        self.grid().set_prolong(class, data, outflows);
    }

    // ── Scatter ─────────────────────────────────────────────────

    /// Assign localities to this subtree, whose pre-order index range
    /// starts at `start`, and forget all relations.
    pub(crate) fn regrid_scatter(
        self: Arc<Self>,
        start: u64,
        total: u64,
    ) -> BoxFuture<'static, Result<(), EngineError>> {
        Box::pin(async move {
            self.refinement_flag.store(0, Ordering::Release);
            self.clear_family();

            let tree = *lock(&self.tree);
            let Some(mut kids) = tree.children else {
                return Ok(());
            };
            let cluster = self.cluster()?;
            let localities = cluster.num_localities();

            let mut starts = [0u64; NCHILD];
            let mut index = start + 1;
            for (ci, kid) in kids.iter_mut().enumerate() {
                starts[ci] = index;
                let target = LocalityId::for_index(index, total, localities);
                if kid.locality != target {
                    *kid = copy_to_locality(&cluster, *kid, target)?;
                }
                index += tree.child_descendant_count[ci];
            }
            lock(&self.tree).children = Some(kids);

            let mut calls = Vec::with_capacity(NCHILD);
            for (kid, start) in kids.into_iter().zip(starts) {
                calls.push(self.client(kid)?.regrid_scatter(start, total)?);
            }
            join_all(calls).await?;
            trace!(node = %self.handle, start, "scattered");
            Ok(())
        })
    }
}

/// Evict `handle` and everything below it. Returns the number of nodes
/// removed.
pub(crate) fn drop_subtree(cluster: &Cluster<Node>, handle: NodeHandle) -> Result<usize, EngineError> {
    let node = cluster.evict(&handle)?;
    let mut removed = 1;
    if let Some(kids) = node.children() {
        for child in kids {
            removed += drop_subtree(cluster, child)?;
        }
    }
    Ok(removed)
}

/// Move a node to `target`: evict it, ship its subgrid as bytes, and
/// register a fresh incarnation there. The old handle goes stale.
fn copy_to_locality(
    cluster: &Cluster<Node>,
    handle: NodeHandle,
    target: LocalityId,
) -> Result<NodeHandle, EngineError> {
    let old = cluster.evict(&handle)?;
    let bytes = old.grid().encode();
    let grid = old.factory.decode(&handle.location, &bytes)?;
    let tree = *lock(&old.tree);
    let seed = old.seed(grid, tree, old.clock());
    let (moved, _) = cluster.spawn(target, handle.location, |h| Node::from_seed(h, seed))?;
    cluster.record(RpcKind::Migration);
    debug!(from = %handle, to = %moved, bytes = bytes.len(), "migrated");
    Ok(moved)
}
