//! End-to-end AMR cycle on mock subgrids.
//!
//! Demonstrates: build a tree → step → refine a corner → step → save →
//! load into a fresh simulation on more localities → step again.

use std::sync::Arc;

use arbor_bench::{reference_profile, runtime};
use arbor_core::{NodeLocation, Octant};
use arbor_engine::Simulation;
use arbor_test_utils::{scratch_path, MockFactory};

type BoxError = Box<dyn std::error::Error>;

fn main() -> Result<(), BoxError> {
    println!("=== Arbor AMR Cycle Example ===\n");
    let rt = runtime()?;
    rt.block_on(async {
        let (config, plan) = reference_profile(2);
        let factory = MockFactory::new(plan);
        let sim = Simulation::new(config.clone(), Arc::new(factory.clone()))?;
        let nodes = sim.initialize().await?;
        println!("initial tree: {nodes} nodes, {:?}", sim.census()?.per_locality);

        for _ in 0..3 {
            let m = sim.step().await?;
            println!(
                "step {:>3}  dt={:.3}  nodes={}  rpcs={}  {}us",
                m.step_num,
                m.dt,
                m.node_count,
                m.rpc.total(),
                m.total_us
            );
        }

        println!("\nRefining one level-2 corner");
        let corner = NodeLocation::ROOT
            .get_child(Octant::ALL[0])?
            .get_child(Octant::ALL[0])?;
        factory.plan().insert(corner);
        let m = sim.regrid(false).await?;
        println!(
            "regrid: nodes={} created={} removed={} migrated={}",
            m.node_count, m.created, m.removed, m.migrated
        );
        sim.step().await?;

        let path = scratch_path("example");
        let records = sim.save(&path).await?;
        println!("\nSaved {records} records to {}", path.display());

        let mut restored = Simulation::new(
            config.with_localities(4),
            Arc::new(MockFactory::default()),
        )?;
        let output = restored.load(&path, true).await?;
        std::fs::remove_file(&path)?;
        println!("restored {} leaves over 4 localities", output.len());
        println!("per locality: {:?}", restored.census()?.per_locality);

        let m = restored.step().await?;
        println!("resumed at step {} (dt={:.3})", m.step_num, m.dt);
        Ok::<(), BoxError>(())
    })
}
