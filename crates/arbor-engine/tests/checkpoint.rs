//! Checkpoint save/load through the tree.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor_checkpoint::{
    child_record_indices, record_size_for, CheckpointError, CheckpointReader, Record, RecordFlag,
    RecordHeader, RecordWriter, Trailer, HEADER_LEN,
};
use arbor_core::{NodeLocation, Octant, ProtocolError, RunConfig, SubgridFactory};
use arbor_engine::{EngineError, Simulation};
use arbor_test_utils::{scratch_path, MockFactory, RefinementPlan};
use indexmap::IndexMap;

fn config() -> RunConfig {
    RunConfig::default()
        .with_physics(true, false, false)
        .with_max_level(3)
        .with_fatal_policy(false, Duration::from_millis(1))
}

fn level1(octant: usize) -> NodeLocation {
    NodeLocation::ROOT.get_child(Octant::ALL[octant]).unwrap()
}

/// The 17-node tree: root, eight children, octant 0 refined once more.
async fn stepped_sim(config: RunConfig, steps: u32) -> Simulation {
    let plan = RefinementPlan::uniform(1);
    plan.insert(level1(0));
    let sim = Simulation::new(config, Arc::new(MockFactory::new(plan))).unwrap();
    sim.initialize().await.unwrap();
    for _ in 0..steps {
        sim.step().await.unwrap();
    }
    sim
}

fn empty_sim(config: RunConfig) -> Simulation {
    Simulation::new(config, Arc::new(MockFactory::default())).unwrap()
}

fn encoded(sim: &Simulation) -> IndexMap<NodeLocation, Vec<u8>> {
    let mut out: IndexMap<_, _> = sim
        .cluster()
        .localities()
        .flat_map(|l| l.handles())
        .map(|h| {
            let node = sim.cluster().resolve(&h).unwrap();
            (h.location, node.with_grid(|g| g.encode()))
        })
        .collect();
    out.sort_keys();
    out
}

/// Overwrite bytes at `offset` within record `record`.
fn overwrite(path: &Path, record: u64, offset: usize, bytes: &[u8]) {
    let record_size = CheckpointReader::open_path(path)
        .unwrap()
        .trailer()
        .record_size;
    let mut f = OpenOptions::new().write(true).open(path).unwrap();
    f.seek(SeekFrom::Start(record_size * record + offset as u64))
        .unwrap();
    f.write_all(bytes).unwrap();
}

fn corrupt_flag(path: &Path, record: u64) {
    overwrite(path, record, 0, b"x");
}

/// Shift child `slot` of `record` by `delta` records.
fn shift_child_record(path: &Path, record: u64, slot: usize, delta: u64) {
    let header = CheckpointReader::open_path(path)
        .unwrap()
        .read_record(record)
        .unwrap()
        .header;
    let moved = header.child_records[slot] + delta;
    overwrite(path, record, 1 + 8 * slot, &(moved as i64).to_le_bytes());
}

fn subtree_size(loc: NodeLocation, refined: &[NodeLocation]) -> u64 {
    if !refined.contains(&loc) {
        return 1;
    }
    1 + Octant::ALL
        .iter()
        .map(|o| subtree_size(loc.get_child(*o).unwrap(), refined))
        .sum::<u64>()
}

fn emit(
    writer: &mut RecordWriter<Vec<u8>>,
    factory: &MockFactory,
    loc: NodeLocation,
    refined: &[NodeLocation],
) {
    let index = writer.records_written();
    let is_refined = refined.contains(&loc);
    let (flag, child_records) = if is_refined {
        let counts = Octant::ALL.map(|o| subtree_size(loc.get_child(o).unwrap(), refined));
        (RecordFlag::Refined, child_record_indices(index, &counts))
    } else {
        (RecordFlag::Leaf, [index + 1; 8])
    };
    let header = RecordHeader {
        flag,
        child_records,
        step_num: 0,
        current_time: 0.0,
        rotational_time: 0.0,
    };
    let payload = factory.create(&loc).encode();
    writer.write_record(&Record { header, payload }).unwrap();
    if is_refined {
        for o in Octant::ALL {
            emit(writer, factory, loc.get_child(o).unwrap(), refined);
        }
    }
}

/// Write a checkpoint of the tree in which exactly `refined` are refined,
/// bypassing regrid.
fn write_tree(path: &Path, refined: &[NodeLocation]) {
    let factory = MockFactory::default();
    let record_size = record_size_for(factory.max_encoded_len());
    let mut writer = RecordWriter::new(Vec::new(), record_size).unwrap();
    emit(&mut writer, &factory, NodeLocation::ROOT, refined);
    let trailer = Trailer {
        omega: 0.0,
        pivot: [0.0; 3],
        record_size,
    };
    std::fs::write(path, writer.finish(&trailer).unwrap()).unwrap();
}

fn grace() -> Duration {
    Duration::from_millis(40)
}

// ── Round trip ──────────────────────────────────────────────────

#[tokio::test]
async fn save_then_load_restores_the_tree() {
    let path = scratch_path("roundtrip");
    let sim = stepped_sim(config(), 2).await;
    sim.set_frame(0.25, [1.0, 2.0, 3.0]).unwrap();
    assert_eq!(sim.save(&path).await.unwrap(), 17);

    let mut loaded = empty_sim(config());
    let output = loaded.load(&path, true).await.unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(output, sim.output().await.unwrap());
    assert_eq!(output.len(), 15);
    assert_eq!(loaded.census().unwrap(), sim.census().unwrap());
    assert_eq!(encoded(&loaded), encoded(&sim));

    let clock = loaded.clock().unwrap();
    assert_eq!(clock, sim.clock().unwrap());
    assert_eq!(clock.step_num, 2);

    let frame = loaded.cluster().frame(arbor_core::LocalityId(0)).unwrap();
    assert_eq!(frame.omega, 0.25);
    assert_eq!(frame.pivot, [1.0, 2.0, 3.0]);
}

#[tokio::test]
async fn load_without_output_returns_nothing() {
    let path = scratch_path("no_output");
    let sim = stepped_sim(config(), 1).await;
    sim.save(&path).await.unwrap();

    let mut loaded = empty_sim(config());
    let output = loaded.load(&path, false).await.unwrap();
    let _ = std::fs::remove_file(&path);
    assert!(output.is_empty());
    assert_eq!(loaded.cluster().node_count(), 17);
}

#[tokio::test]
async fn loaded_tree_keeps_stepping() {
    let path = scratch_path("resume");
    let sim = stepped_sim(config(), 1).await;
    sim.save(&path).await.unwrap();
    let mut loaded = empty_sim(config());
    loaded.load(&path, false).await.unwrap();
    let _ = std::fs::remove_file(&path);

    let a = sim.step().await.unwrap();
    let b = loaded.step().await.unwrap();
    assert_eq!(a.dt, b.dt);
    assert_eq!(b.step_num, 2);
    assert_eq!(sim.output().await.unwrap(), loaded.output().await.unwrap());
}

#[tokio::test]
async fn load_spreads_records_over_localities() {
    let path = scratch_path("spread");
    let sim = stepped_sim(config(), 0).await;
    sim.save(&path).await.unwrap();

    let mut loaded = empty_sim(config().with_localities(4));
    loaded.load(&path, false).await.unwrap();
    let _ = std::fs::remove_file(&path);

    let census = loaded.census().unwrap();
    assert_eq!(census.nodes, 17);
    assert_eq!(census.per_locality.len(), 4);
}

// ── Corruption ──────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_flag_is_reported() {
    let path = scratch_path("corrupt");
    let sim = stepped_sim(config(), 1).await;
    sim.save(&path).await.unwrap();
    corrupt_flag(&path, 3);

    let mut loaded = empty_sim(config());
    let err = loaded.load(&path, false).await.unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(
        matches!(
            err,
            EngineError::Checkpoint(CheckpointError::CorruptFlag { byte: b'x', record: 3 })
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn truncated_file_is_rejected() {
    let path = scratch_path("short");
    std::fs::write(&path, [0u8; 7]).unwrap();
    let mut loaded = empty_sim(config());
    let err = loaded.load(&path, false).await.unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(
        matches!(err, EngineError::Checkpoint(CheckpointError::Truncated { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn shifted_child_offset_is_fatal() {
    let path = scratch_path("offsets");
    let sim = stepped_sim(config(), 1).await;
    sim.save(&path).await.unwrap();
    shift_child_record(&path, 0, 1, 1);

    let mut loaded = empty_sim(config().with_fatal_policy(false, grace()));
    let start = Instant::now();
    let err = loaded.load(&path, false).await.unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(
        matches!(
            err,
            EngineError::Checkpoint(CheckpointError::CorruptOffsets { record: 0, .. })
        ),
        "{err:?}"
    );
    assert!(start.elapsed() >= grace());
}

#[tokio::test]
async fn undecodable_payload_is_fatal() {
    let path = scratch_path("payload");
    let sim = stepped_sim(config(), 1).await;
    sim.save(&path).await.unwrap();
    // Record 10 is octant 1; overwrite the location key its payload starts with.
    overwrite(&path, 10, HEADER_LEN, &u64::MAX.to_le_bytes());

    let mut loaded = empty_sim(config().with_fatal_policy(false, grace()));
    let start = Instant::now();
    let err = loaded.load(&path, false).await.unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert!(matches!(err, EngineError::Subgrid(_)), "{err:?}");
    assert!(start.elapsed() >= grace());
}

#[tokio::test]
async fn short_file_waits_out_the_grace_period() {
    let path = scratch_path("short_grace");
    std::fs::write(&path, [0u8; 7]).unwrap();
    let mut loaded = empty_sim(config().with_fatal_policy(false, grace()));
    let start = Instant::now();
    assert!(loaded.load(&path, false).await.is_err());
    let _ = std::fs::remove_file(&path);
    assert!(start.elapsed() >= grace());
}

// ── Balance ─────────────────────────────────────────────────────

#[tokio::test]
async fn census_accepts_a_one_level_jump() {
    let path = scratch_path("one_jump");
    write_tree(&path, &[NodeLocation::ROOT, level1(0)]);
    let mut loaded = empty_sim(config());
    loaded.load(&path, false).await.unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(loaded.census().unwrap().nodes, 17);
}

#[tokio::test]
async fn census_rejects_a_two_level_jump() {
    // The +x level-3 cells under `deep` touch the root's octant 1, which
    // is still a level-1 leaf.
    let path = scratch_path("two_jumps");
    let deep = level1(0).get_child(Octant::ALL[1]).unwrap();
    write_tree(&path, &[NodeLocation::ROOT, level1(0), deep]);
    let mut loaded = empty_sim(config());
    loaded.load(&path, false).await.unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.cluster().node_count(), 25);
    let err = loaded.census().unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::Protocol(ProtocolError::InconsistentTopology { .. })
        ),
        "{err:?}"
    );
}
