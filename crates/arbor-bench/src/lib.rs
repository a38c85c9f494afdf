//! Benchmark profiles for the Arbor octree framework.
//!
//! - [`reference_profile`]: uniform level-2 tree (73 nodes), hydro + gravity
//! - [`stress_profile`]: seeded random tree down to level 4
//! - [`runtime`]: the multi-threaded tokio runtime every bench drives
//!   simulations on

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use arbor_core::RunConfig;
use arbor_engine::{EngineError, Simulation};
use arbor_test_utils::{MockFactory, RefinementPlan};

/// Uniform level-2 tree over `localities` localities, with room for one
/// more level of refinement.
///
/// Physics: hydro and gravity on, radiation off. Subgrids are mocks, so
/// timings measure coordination overhead only.
pub fn reference_profile(localities: u32) -> (RunConfig, RefinementPlan) {
    let config = RunConfig::default()
        .with_physics(true, true, false)
        .with_localities(localities)
        .with_max_level(3);
    (config, RefinementPlan::uniform(2))
}

/// Random tree with refinement probability 0.4 per child, max level 4.
pub fn stress_profile(seed: u64, localities: u32) -> (RunConfig, RefinementPlan) {
    let config = RunConfig::default()
        .with_physics(true, true, true)
        .with_localities(localities)
        .with_max_level(4);
    (config, RefinementPlan::random(seed, 4, 0.4))
}

/// Build and initialize a simulation for `profile`.
pub async fn build(profile: (RunConfig, RefinementPlan)) -> Result<Simulation, EngineError> {
    let (config, plan) = profile;
    let sim = Simulation::new(config, Arc::new(MockFactory::new(plan)))?;
    sim.initialize().await?;
    Ok(sim)
}

/// Multi-threaded runtime with four workers.
pub fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
}
