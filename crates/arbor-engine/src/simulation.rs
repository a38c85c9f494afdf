//! Tree-wide driver.
//!
//! [`Simulation`] owns the routing table and the root handle and sequences
//! the tree-wide operations: regrid (votes, gather, scatter, `form_tree`),
//! stepping, gravity, checkpoint save/load and output. Every operation
//! starts at the root and returns once the whole tree has finished it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbor_core::{RunConfig, SubgridFactory};
//! use arbor_engine::{EngineError, Simulation};
//!
//! async fn run(factory: Arc<dyn SubgridFactory>) -> Result<(), EngineError> {
//!     let config = RunConfig::default().with_max_level(2);
//!     let sim = Simulation::new(config, factory)?;
//!     sim.initialize().await?;
//!     for _ in 0..10 {
//!         let m = sim.step().await?;
//!         println!("dt = {}", m.dt);
//!     }
//!     sim.save(std::path::Path::new("restart.chk")).await?;
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arbor_checkpoint::{finish_file, record_size_for, CheckpointError, Trailer};
use arbor_core::{
    Link, LocalityId, NodeHandle, NodeLocation, OutputList, Real, RunConfig, SubgridFactory,
    NDIRECTION,
};
use arbor_runtime::{join_one, Cluster, FrameState, RpcKind};
use indexmap::IndexSet;
use tracing::{info, instrument};

use crate::census::TreeCensus;
use crate::client::NodeClient;
use crate::error::EngineError;
use crate::metrics::{RegridMetrics, StepMetrics};
use crate::node::{Clock, Node, NodeSeed, TreeState};
use crate::persist::{blocking, fatal, screen, LoadContext, SaveTarget};
use crate::regrid::drop_subtree;

/// A distributed octree simulation.
pub struct Simulation {
    config: Arc<RunConfig>,
    cluster: Arc<Cluster<Node>>,
    factory: Arc<dyn SubgridFactory>,
    root: NodeHandle,
}

// Compile-time assertion: a simulation can be driven from any task.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Simulation>();
};

impl Simulation {
    /// Validate `config` and create a tree consisting of a single root
    /// leaf on locality 0.
    pub fn new(config: RunConfig, factory: Arc<dyn SubgridFactory>) -> Result<Self, EngineError> {
        config.validate()?;
        let config = Arc::new(config);
        let cluster = Arc::new(Cluster::new(config.localities));
        let root = spawn_root(&config, &cluster, &factory)?;
        Ok(Self {
            config,
            cluster,
            factory,
            root,
        })
    }

    /// The root's handle.
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// The root node.
    pub fn root_node(&self) -> Result<Arc<Node>, EngineError> {
        Ok(self.cluster.resolve(&self.root)?)
    }

    /// The routing table.
    pub fn cluster(&self) -> &Arc<Cluster<Node>> {
        &self.cluster
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// A client for any handle in this simulation.
    pub fn client(&self, handle: NodeHandle) -> NodeClient {
        NodeClient::new(handle, Arc::clone(&self.cluster))
    }

    fn root_client(&self) -> NodeClient {
        self.client(self.root)
    }

    /// The root's clock.
    pub fn clock(&self) -> Result<Clock, EngineError> {
        Ok(self.root_node()?.clock())
    }

    /// Simulation time at the root.
    pub fn current_time(&self) -> Result<Real, EngineError> {
        Ok(self.clock()?.current_time)
    }

    /// Set the rotating frame on every locality, keeping the known record
    /// size.
    pub fn set_frame(&self, omega: Real, pivot: [Real; 3]) -> Result<(), EngineError> {
        let mut frame = self.cluster.frame(LocalityId(0))?;
        frame.omega = omega;
        frame.pivot = pivot;
        self.cluster.broadcast_frame(frame);
        Ok(())
    }

    // ── Topology ────────────────────────────────────────────────

    /// Rebuild every relation from the root down.
    pub async fn form_tree(&self) -> Result<(), EngineError> {
        let call = self
            .root_client()
            .form_tree(None, [Link::DomainEdge; NDIRECTION])?;
        join_one(call).await
    }

    /// Verify the tree's relations and count it.
    pub fn census(&self) -> Result<TreeCensus, EngineError> {
        TreeCensus::take(&self.cluster, self.root)
    }

    fn locations(&self) -> IndexSet<NodeLocation> {
        self.cluster
            .localities()
            .flat_map(|l| l.handles())
            .map(|h| h.location)
            .collect()
    }

    /// Run one regrid: refinement votes (unless `rebalance_only`), gather,
    /// scatter, `form_tree`, then a gravity solve once time has advanced.
    #[instrument(skip(self), fields(root = %self.root))]
    pub async fn regrid(&self, rebalance_only: bool) -> Result<RegridMetrics, EngineError> {
        let start = Instant::now();
        let before = self.locations();
        let rpc_before = self.cluster.counters().snapshot();
        let root = self.root_client();

        if !rebalance_only {
            info!("checking for refinement");
            join_one(root.check_for_refinement()?).await?;
        }
        info!("regridding");
        let count = join_one(root.regrid_gather(rebalance_only)?).await?;
        info!("rebalancing {count} nodes");
        join_one(root.regrid_scatter(0, count)?).await?;
        info!("forming tree connections");
        self.form_tree().await?;

        if self.config.gravity_on && self.current_time()? > 0.0 {
            self.solve_gravity().await?;
        }

        let after = self.locations();
        let migrated = self
            .cluster
            .counters()
            .snapshot()
            .since(&rpc_before)
            .get(RpcKind::Migration);
        Ok(RegridMetrics {
            node_count: count,
            created: after.difference(&before).count(),
            removed: before.difference(&after).count(),
            migrated,
            total_us: start.elapsed().as_micros() as u64,
        })
    }

    /// Regrid from a single root until the tree stops changing, at most
    /// `max_level + 1` times. Returns the final node count.
    pub async fn initialize(&self) -> Result<u64, EngineError> {
        let mut count = 1;
        for pass in 0..=self.config.max_level {
            let m = self.regrid(false).await?;
            count = m.node_count;
            info!(pass, nodes = count, "initial regrid");
            if m.created == 0 && m.removed == 0 {
                break;
            }
        }
        Ok(count)
    }

    // ── Stepping ────────────────────────────────────────────────

    /// Advance the whole tree by one global timestep.
    pub async fn step(&self) -> Result<StepMetrics, EngineError> {
        let start = Instant::now();
        let rpc_before = self.cluster.counters().snapshot();
        let dt = join_one(self.root_client().step()?).await?;
        let metrics = StepMetrics {
            dt,
            step_num: self.clock()?.step_num,
            node_count: self.cluster.node_count(),
            total_us: start.elapsed().as_micros() as u64,
            rpc: self.cluster.counters().snapshot().since(&rpc_before),
        };
        info!(step = metrics.step_num, dt, us = metrics.total_us, "step");
        Ok(metrics)
    }

    /// One gravity solve over the whole tree.
    pub async fn solve_gravity(&self) -> Result<(), EngineError> {
        join_one(self.root_client().solve_gravity()?).await
    }

    /// Output chunks of every leaf, in depth-first octant order.
    pub async fn output(&self) -> Result<OutputList, EngineError> {
        join_one(self.root_client().output()?).await
    }

    // ── Checkpoint ──────────────────────────────────────────────

    /// Write the whole tree to `path`. Returns the number of records.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<u64, EngineError> {
        let record_size = record_size_for(self.factory.max_encoded_len());
        let target = Arc::new(SaveTarget {
            path: path.to_path_buf(),
            record_size,
        });
        let records = join_one(self.root_client().save(0, target)?).await?;

        let frame = self.cluster.frame(LocalityId(0))?;
        let trailer = Trailer {
            omega: frame.omega,
            pivot: frame.pivot,
            record_size,
        };
        let path_buf = path.to_path_buf();
        blocking(move || finish_file(&path_buf, records, &trailer)).await?;
        info!(records, record_size, "checkpoint written");
        Ok(records)
    }

    /// Replace the current tree with the one stored at `path`, then
    /// rebalance and re-form it. Returns the leaves' output when
    /// `do_output` is set.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn load(&mut self, path: &Path, do_output: bool) -> Result<OutputList, EngineError> {
        let path_buf = path.to_path_buf();
        let opened = blocking(move || LoadContext::open(&path_buf, do_output)).await;
        let ctx = Arc::new(screen(&self.config, opened).await?);
        let trailer = ctx.trailer();
        self.cluster.broadcast_frame(FrameState {
            omega: trailer.omega,
            pivot: trailer.pivot,
            record_size: Some(trailer.record_size),
        });

        let removed = drop_subtree(&self.cluster, self.root)?;
        self.root = spawn_root(&self.config, &self.cluster, &self.factory)?;
        info!(removed, records = ctx.total(), "loading checkpoint");

        let outcome = join_one(self.root_client().load(0, Arc::clone(&ctx))?).await?;
        if outcome.next != ctx.total() {
            let err = CheckpointError::CorruptOffsets {
                record: 0,
                detail: format!(
                    "tree ends at record {} but file holds {}",
                    outcome.next,
                    ctx.total()
                ),
            };
            return Err(fatal(&self.config, err.into()).await);
        }
        self.regrid(true).await?;
        Ok(outcome.output)
    }
}

fn spawn_root(
    config: &Arc<RunConfig>,
    cluster: &Arc<Cluster<Node>>,
    factory: &Arc<dyn SubgridFactory>,
) -> Result<NodeHandle, EngineError> {
    let seed = NodeSeed {
        config: Arc::clone(config),
        cluster: Arc::downgrade(cluster),
        factory: Arc::clone(factory),
        grid: factory.create(&NodeLocation::ROOT),
        tree: TreeState::default(),
        clock: Clock::default(),
    };
    let (root, _) = cluster.spawn(LocalityId(0), NodeLocation::ROOT, |h| {
        Node::from_seed(h, seed)
    })?;
    Ok(root)
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("root", &self.root)
            .field("nodes", &self.cluster.node_count())
            .finish()
    }
}
