//! One-step protocols: boundary exchange, timestep, flux correction,
//! restriction and gravity.

use std::sync::Arc;

use arbor_core::{
    Direction, Face, FieldClass, Link, NodeHandle, NodeLocation, Octant, Real, RunConfig,
};
use arbor_engine::Simulation;
use arbor_runtime::{ChannelStats, RpcKind};
use arbor_test_utils::{MockFactory, RefinementPlan};

fn level1(octant: usize) -> NodeLocation {
    NodeLocation::ROOT.get_child(Octant::ALL[octant]).unwrap()
}

async fn build(config: RunConfig, plan: RefinementPlan) -> (Simulation, MockFactory) {
    let factory = MockFactory::new(plan);
    let sim = Simulation::new(config, Arc::new(factory.clone())).unwrap();
    sim.initialize().await.unwrap();
    (sim, factory)
}

fn amr_plan() -> RefinementPlan {
    let plan = RefinementPlan::uniform(1);
    plan.insert(level1(0));
    plan
}

fn all_handles(sim: &Simulation) -> Vec<NodeHandle> {
    sim.cluster().localities().flat_map(|l| l.handles()).collect()
}

// ── Boundary exchange ───────────────────────────────────────────

#[tokio::test]
async fn domain_edge_is_never_sent_or_awaited() {
    let config = RunConfig::default().with_physics(true, false, false);
    let (sim, factory) = build(config, RefinementPlan::uniform(1)).await;
    sim.step().await.unwrap();

    let kids = sim.root_node().unwrap().children().unwrap();
    let c0 = sim.cluster().resolve(&kids[0]).unwrap();
    let minus_x = Direction::from_offset([-1, 0, 0]).unwrap();
    let plus_x = Direction::from_offset([1, 0, 0]).unwrap();

    assert_eq!(c0.neighbor(minus_x), Link::DomainEdge);
    assert_eq!(
        c0.boundary_channel_stats(FieldClass::Hydro, minus_x),
        ChannelStats::default()
    );
    assert_eq!(
        c0.boundary_channel_stats(FieldClass::Hydro, plus_x),
        ChannelStats { sets: 1, gets: 1 }
    );
    let log = factory.ledger().log(&level1(0));
    assert!(!log.boundaries.contains(&(FieldClass::Hydro, minus_x)));
    assert!(log.boundaries.contains(&(FieldClass::Hydro, plus_x)));
}

#[tokio::test]
async fn every_live_direction_is_used_exactly_once_per_step() {
    let config = RunConfig::default().with_physics(true, false, true);
    let (sim, _f) = build(config, amr_plan()).await;
    let steps = 3;
    for _ in 0..steps {
        sim.step().await.unwrap();
    }

    for handle in all_handles(&sim) {
        let node = sim.cluster().resolve(&handle).unwrap();
        for dir in Direction::ALL {
            let awaited = match node.neighbor(dir) {
                Link::Present(_) => true,
                Link::Coarser => dir.to_face().is_some_and(|f| node.aunt(f).is_some()),
                Link::DomainEdge => false,
            };
            let expected = if awaited {
                ChannelStats { sets: steps, gets: steps }
            } else {
                ChannelStats::default()
            };
            for class in [FieldClass::Hydro, FieldClass::Radiation] {
                assert_eq!(
                    node.boundary_channel_stats(class, dir),
                    expected,
                    "{handle} {class} {dir}"
                );
            }
        }
        for face in Face::ALL {
            let expected = if node.nieces(face).is_empty() { 0 } else { steps };
            for stats in node.niece_channel_stats(FieldClass::Hydro, face) {
                assert_eq!(stats, ChannelStats { sets: expected, gets: expected });
            }
        }
    }
}

#[tokio::test]
async fn aunt_merges_niece_boundaries_and_feeds_coarse_ghosts() {
    let config = RunConfig::default().with_physics(true, false, false);
    let (sim, factory) = build(config, amr_plan()).await;
    sim.step().await.unwrap();

    let minus_x = Face::ALL[0];
    let plus_x = Face::ALL[1];
    let aunt_log = factory.ledger().log(&level1(1));
    assert_eq!(
        aunt_log
            .niece_faces
            .iter()
            .filter(|e| **e == (FieldClass::Hydro, minus_x))
            .count(),
        1
    );
    for octant in plus_x.child_octants() {
        let niece = level1(0).get_child(octant).unwrap();
        let log = factory.ledger().log(&niece);
        assert!(log
            .boundaries
            .contains(&(FieldClass::Hydro, plus_x.to_direction())));
    }
}

// ── Timestep ────────────────────────────────────────────────────

#[tokio::test]
async fn every_leaf_advances_by_the_global_minimum() {
    let config = RunConfig::default().with_physics(true, false, false);
    let (sim, factory) = build(config, amr_plan()).await;
    let deep = level1(0).get_child(Octant::ALL[5]).unwrap();
    factory.set_timestep(deep, 0.004);
    factory.set_timestep(level1(6), 0.02);

    let m = sim.step().await.unwrap();
    assert_eq!(m.dt, 0.004);
    assert_eq!(m.step_num, 1);
    assert_eq!(m.node_count, 17);
    assert_eq!(m.rpc.get(RpcKind::LocalTimestep), 16);
    assert_eq!(m.rpc.get(RpcKind::GlobalTimestep), 16);

    for handle in all_handles(&sim) {
        let node = sim.cluster().resolve(&handle).unwrap();
        let log = factory.ledger().log(&handle.location);
        if node.is_refined() {
            assert!(log.advances.is_empty(), "{handle} advanced while refined");
        } else {
            assert_eq!(log.advances, vec![0.004], "{handle}");
        }
        assert_eq!(node.clock().step_num, 1);
        assert!((node.clock().current_time - 0.004).abs() < 1e-15);
    }
}

#[tokio::test]
async fn rotational_time_follows_frame_rate() {
    let config = RunConfig::default().with_physics(true, false, false);
    let (sim, _f) = build(config, RefinementPlan::uniform(1)).await;
    sim.set_frame(2.0, [0.5, 0.5, 0.5]).unwrap();
    sim.step().await.unwrap();
    let clock = sim.clock().unwrap();
    assert!((clock.rotational_time - 2.0 * MockFactory::DEFAULT_DT).abs() < 1e-12);
}

// ── Flux correction ─────────────────────────────────────────────

#[tokio::test]
async fn coarse_correction_equals_sum_of_fine_contributions() {
    let config = RunConfig::default().with_physics(true, false, true);
    let (sim, factory) = build(config, amr_plan()).await;
    sim.step().await.unwrap();

    let ledger = factory.ledger();
    let mut checked = 0;
    for handle in all_handles(&sim) {
        let aunt = sim.cluster().resolve(&handle).unwrap();
        for face in Face::ALL {
            let nieces = aunt.nieces(face);
            if nieces.is_empty() {
                continue;
            }
            for class in [FieldClass::Hydro, FieldClass::Radiation] {
                let sent: Real = nieces
                    .iter()
                    .flat_map(|n| ledger.log(&n.location).flux_sent)
                    .filter(|(c, f, _)| *c == class && *f == face.opposite())
                    .map(|(_, _, v)| v)
                    .sum();
                let applied: Vec<Real> = ledger
                    .log(&handle.location)
                    .flux_applied
                    .into_iter()
                    .filter(|(c, f, _)| *c == class && *f == face)
                    .map(|(_, _, v)| v)
                    .collect();
                assert_eq!(applied.len(), 1, "{handle} {class} {face}");
                assert!((applied[0] - sent).abs() < 1e-9);
                checked += 1;
            }
        }
    }
    // c1, c2 and c4 each border c0 across one face; two classes each.
    assert_eq!(checked, 6);
}

// ── Restriction ─────────────────────────────────────────────────

#[tokio::test]
async fn parents_merge_all_eight_children() {
    let config = RunConfig::default().with_physics(true, false, false);
    let (sim, factory) = build(config, amr_plan()).await;
    sim.step().await.unwrap();

    for loc in [NodeLocation::ROOT, level1(0)] {
        let mut got: Vec<Octant> = factory
            .ledger()
            .log(&loc)
            .restricted
            .into_iter()
            .map(|(_, o)| o)
            .collect();
        got.sort();
        assert_eq!(got, Octant::ALL.to_vec(), "{loc}");
    }
    assert!(factory.ledger().log(&level1(3)).restricted.is_empty());
}

// ── Gravity ─────────────────────────────────────────────────────

#[tokio::test]
async fn gravity_sweeps_up_across_and_down() {
    let config = RunConfig::default().with_physics(true, true, false);
    let (sim, factory) = build(config, RefinementPlan::uniform(1)).await;
    let m = sim.step().await.unwrap();
    assert_eq!(m.rpc.get(RpcKind::Multipole), 8);
    assert_eq!(m.rpc.get(RpcKind::Expansion), 8);
    assert_eq!(m.rpc.get(RpcKind::GravityBoundary), 8 * 7);

    let ledger = factory.ledger();
    assert_eq!(ledger.log(&NodeLocation::ROOT).expansions, vec![false]);
    for o in 0..8 {
        let log = ledger.log(&level1(o));
        assert_eq!(log.expansions, vec![true]);
        assert_eq!(log.gravity.len(), 7);
        assert!(log.gravity.iter().all(|(_, monopole)| *monopole));
    }
}
