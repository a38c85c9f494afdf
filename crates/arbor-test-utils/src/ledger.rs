//! Shared record of collaborator calls, keyed by location.

use std::sync::{Mutex, PoisonError};

use arbor_core::{Direction, Face, FieldClass, NodeLocation, Octant, Real};
use indexmap::IndexMap;

/// Everything observed at one location, across every subgrid that has
/// lived there.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocationLog {
    /// Ghost slabs merged, by class and inbound direction.
    pub boundaries: Vec<(FieldClass, Direction)>,
    /// Niece faces merged (four slabs each).
    pub niece_faces: Vec<(FieldClass, Face)>,
    /// Flux corrections produced, with the sum of their values.
    pub flux_sent: Vec<(FieldClass, Face, Real)>,
    /// Flux corrections applied, with the sum over all four nieces.
    pub flux_applied: Vec<(FieldClass, Face, Real)>,
    /// Timesteps advanced by.
    pub advances: Vec<Real>,
    /// Children's restricted data merged.
    pub restricted: Vec<(FieldClass, Octant)>,
    /// Gravity boundaries merged, with the monopole flag.
    pub gravity: Vec<(Direction, bool)>,
    /// Expansions computed; `true` when a parent expansion was supplied.
    pub expansions: Vec<bool>,
    /// Prolonged data received, by class.
    pub prolonged: Vec<FieldClass>,
    /// Last leaf/refined notification.
    pub leaf: Option<bool>,
}

/// Thread-safe map from location to [`LocationLog`].
#[derive(Debug, Default)]
pub struct Ledger {
    logs: Mutex<IndexMap<NodeLocation, LocationLog>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, location: NodeLocation, f: impl FnOnce(&mut LocationLog)) {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        f(logs.entry(location).or_default());
    }

    /// Copy of the log at `location`; empty if nothing was recorded.
    pub fn log(&self, location: &NodeLocation) -> LocationLog {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(location).cloned().unwrap_or_default()
    }

    /// Every location with a log, in first-seen order.
    pub fn locations(&self) -> Vec<NodeLocation> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.keys().copied().collect()
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
