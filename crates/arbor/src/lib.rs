//! Arbor: distributed adaptive octree coordination.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Arbor sub-crates. Arbor owns the tree (refinement, 2:1 balance,
//! neighbor and aunt/niece wiring, per-step exchanges, load balancing and
//! checkpoints); the numerics live behind the [`types::Subgrid`] trait you
//! implement.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbor::prelude::*;
//!
//! async fn run(factory: Arc<dyn SubgridFactory>) -> Result<(), EngineError> {
//!     let config = RunConfig::default()
//!         .with_physics(true, true, false)
//!         .with_localities(4)
//!         .with_max_level(3);
//!     let sim = Simulation::new(config, factory)?;
//!     sim.initialize().await?;
//!     for step in 0..100 {
//!         let m: StepMetrics = sim.step().await?;
//!         if step % 10 == 9 {
//!             sim.regrid(false).await?;
//!         }
//!         assert!(m.dt > 0.0);
//!     }
//!     sim.save(std::path::Path::new("restart.chk")).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `arbor-core` | Geometry, locations, handles, config, errors, `Subgrid` |
//! | [`runtime`] | `arbor-runtime` | Localities, single-slot channels, RPC counters |
//! | [`checkpoint`] | `arbor-checkpoint` | Record-per-node checkpoint format |
//! | [`engine`] | `arbor-engine` | Tree protocols and the [`engine::Simulation`] driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core vocabulary (`arbor-core`).
///
/// Octree geometry ([`types::Octant`], [`types::Face`],
/// [`types::Direction`]), [`types::NodeLocation`], handles, the run
/// configuration and the [`types::Subgrid`] collaborator trait.
pub use arbor_core as types;

/// Simulated distribution (`arbor-runtime`).
///
/// [`runtime::Cluster`] routes handles to nodes on their localities;
/// [`runtime::Channel`] is the single-slot rendezvous every exchange uses.
pub use arbor_runtime as runtime;

/// Checkpoint format (`arbor-checkpoint`).
pub use arbor_checkpoint as checkpoint;

/// Tree protocols and the simulation driver (`arbor-engine`).
pub use arbor_engine as engine;

/// Common imports for typical Arbor usage.
///
/// ```rust
/// use arbor::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use arbor_core::{
        Direction, Face, FieldClass, LocalityId, NodeHandle, NodeLocation, Octant, OutputChunk,
        OutputList, ProlongRegion, Real, RunConfig, Subgrid, SubgridFactory,
    };

    // Errors
    pub use arbor_checkpoint::CheckpointError;
    pub use arbor_core::{ConfigError, LocationError, ProtocolError, SubgridError};

    // Engine
    pub use arbor_engine::{EngineError, RegridMetrics, Simulation, StepMetrics, TreeCensus};
}
