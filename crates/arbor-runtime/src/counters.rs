//! Per-kind counters of inter-node calls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of [`RpcKind`] variants.
pub const RPC_KINDS: usize = 12;

/// Kinds of node-to-node calls that are counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RpcKind {
    /// Same-level hydro ghost slab.
    HydroBoundary,
    /// Same-level radiation ghost slab.
    RadBoundary,
    /// Same-level gravity exchange.
    GravityBoundary,
    /// Fine-to-coarse hydro flux correction.
    HydroFluxCorrect,
    /// Fine-to-coarse radiation flux correction.
    RadFluxCorrect,
    /// Fine-to-coarse boundary slab (niece path).
    NieceBoundary,
    /// Child-to-parent multipole moments.
    Multipole,
    /// Parent-to-child expansion.
    Expansion,
    /// Child-to-parent timestep candidate.
    LocalTimestep,
    /// Parent-to-child global timestep.
    GlobalTimestep,
    /// Child-to-parent restricted interior (hydro or radiation).
    Restriction,
    /// Node moved to another locality.
    Migration,
}

impl RpcKind {
    /// Every kind, in declaration order.
    pub const ALL: [RpcKind; RPC_KINDS] = [
        RpcKind::HydroBoundary,
        RpcKind::RadBoundary,
        RpcKind::GravityBoundary,
        RpcKind::HydroFluxCorrect,
        RpcKind::RadFluxCorrect,
        RpcKind::NieceBoundary,
        RpcKind::Multipole,
        RpcKind::Expansion,
        RpcKind::LocalTimestep,
        RpcKind::GlobalTimestep,
        RpcKind::Restriction,
        RpcKind::Migration,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Short label for logs.
    pub fn label(self) -> &'static str {
        match self {
            RpcKind::HydroBoundary => "hydro_boundary",
            RpcKind::RadBoundary => "rad_boundary",
            RpcKind::GravityBoundary => "gravity_boundary",
            RpcKind::HydroFluxCorrect => "hydro_flux_correct",
            RpcKind::RadFluxCorrect => "rad_flux_correct",
            RpcKind::NieceBoundary => "niece_boundary",
            RpcKind::Multipole => "multipole",
            RpcKind::Expansion => "expansion",
            RpcKind::LocalTimestep => "local_timestep",
            RpcKind::GlobalTimestep => "global_timestep",
            RpcKind::Restriction => "restriction",
            RpcKind::Migration => "migration",
        }
    }
}

impl fmt::Display for RpcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lock-free counters, one per [`RpcKind`].
#[derive(Debug, Default)]
pub struct RpcCounters {
    counts: [AtomicU64; RPC_KINDS],
}

impl RpcCounters {
    /// Count one call.
    pub fn record(&self, kind: RpcKind) {
        self.counts[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RpcSnapshot {
        let mut counts = [0; RPC_KINDS];
        for (out, c) in counts.iter_mut().zip(self.counts.iter()) {
            *out = c.load(Ordering::Relaxed);
        }
        RpcSnapshot { counts }
    }
}

/// Frozen counter values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RpcSnapshot {
    counts: [u64; RPC_KINDS],
}

impl RpcSnapshot {
    /// Count for one kind.
    pub fn get(&self, kind: RpcKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Calls made since `earlier`.
    pub fn since(&self, earlier: &RpcSnapshot) -> RpcSnapshot {
        let mut counts = [0; RPC_KINDS];
        for (i, out) in counts.iter_mut().enumerate() {
            *out = self.counts[i].saturating_sub(earlier.counts[i]);
        }
        RpcSnapshot { counts }
    }

    /// Sum over all kinds.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Non-zero `(kind, count)` pairs.
    pub fn nonzero(&self) -> impl Iterator<Item = (RpcKind, u64)> + '_ {
        RpcKind::ALL
            .iter()
            .map(|k| (*k, self.get(*k)))
            .filter(|(_, n)| *n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_diff() {
        let c = RpcCounters::default();
        c.record(RpcKind::Multipole);
        let before = c.snapshot();
        c.record(RpcKind::Multipole);
        c.record(RpcKind::Migration);
        let after = c.snapshot();
        let d = after.since(&before);
        assert_eq!(d.get(RpcKind::Multipole), 1);
        assert_eq!(d.get(RpcKind::Migration), 1);
        assert_eq!(d.total(), 2);
        assert_eq!(after.get(RpcKind::Multipole), 2);
        assert_eq!(d.nonzero().count(), 2);
    }

    #[test]
    fn labels_are_distinct() {
        let mut labels: Vec<_> = RpcKind::ALL.iter().map(|k| k.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), RpcKind::ALL.len());
    }
}
