//! Per-step and per-regrid metrics.

use arbor_core::Real;
use arbor_runtime::RpcSnapshot;

/// Timing and traffic of one step.
///
/// Durations are in microseconds.
#[derive(Clone, Debug, Default)]
pub struct StepMetrics {
    /// Timestep every node advanced by.
    pub dt: Real,
    /// Root step count after the step.
    pub step_num: u64,
    /// Registered nodes during the step.
    pub node_count: usize,
    /// Wall-clock time of the whole step.
    pub total_us: u64,
    /// Inter-node calls made during the step, per kind.
    pub rpc: RpcSnapshot,
}

/// Outcome of one regrid.
#[derive(Clone, Debug, Default)]
pub struct RegridMetrics {
    /// Nodes in the tree afterwards, as counted by gather.
    pub node_count: u64,
    /// Locations that gained a node.
    pub created: usize,
    /// Locations that lost their node.
    pub removed: usize,
    /// Nodes moved to another locality by scatter.
    pub migrated: u64,
    /// Wall-clock time of the whole regrid, including `form_tree`.
    pub total_us: u64,
}
