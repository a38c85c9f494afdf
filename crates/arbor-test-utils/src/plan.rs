//! Scriptable refinement decisions.

use std::sync::{Arc, PoisonError, RwLock};

use arbor_core::{NodeLocation, Octant};
use indexmap::IndexSet;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Default)]
struct PlanState {
    /// Every location above this level wants refinement.
    uniform_below: u8,
    /// Individually listed locations.
    explicit: IndexSet<NodeLocation>,
}

/// Which locations want refinement. Cloning shares the plan, so a test can
/// change it between regrids.
#[derive(Clone, Debug, Default)]
pub struct RefinementPlan {
    state: Arc<RwLock<PlanState>>,
}

impl RefinementPlan {
    /// A plan under which nothing wants refinement.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every location above `level` wants refinement, giving a complete
    /// tree of depth `level`.
    pub fn uniform(level: u8) -> Self {
        let plan = Self::default();
        plan.set_uniform(level);
        plan
    }

    /// A random subtree: starting at the root, each listed location's
    /// children are listed with probability `p`, down to `max_level - 1`.
    /// The root is always listed.
    pub fn random(seed: u64, max_level: u8, p: f64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let threshold = (p.clamp(0.0, 1.0) * f64::from(u32::MAX)) as u32;
        let plan = Self::default();
        if max_level == 0 {
            return plan;
        }
        let mut frontier = vec![NodeLocation::ROOT];
        while let Some(loc) = frontier.pop() {
            plan.insert(loc);
            if loc.level() + 1 >= max_level {
                continue;
            }
            for octant in Octant::ALL {
                if rng.next_u32() < threshold {
                    if let Ok(child) = loc.get_child(octant) {
                        frontier.push(child);
                    }
                }
            }
        }
        plan
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PlanState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `location` wants refinement.
    pub fn wants(&self, location: &NodeLocation) -> bool {
        let s = self.state.read().unwrap_or_else(PoisonError::into_inner);
        location.level() < s.uniform_below || s.explicit.contains(location)
    }

    pub fn set_uniform(&self, level: u8) {
        self.write().uniform_below = level;
    }

    pub fn insert(&self, location: NodeLocation) {
        self.write().explicit.insert(location);
    }

    pub fn remove(&self, location: &NodeLocation) {
        self.write().explicit.shift_remove(location);
    }

    /// Back to a plan under which nothing wants refinement.
    pub fn clear(&self) {
        let mut s = self.write();
        s.uniform_below = 0;
        s.explicit.clear();
    }

    /// Explicitly listed locations.
    pub fn listed(&self) -> Vec<NodeLocation> {
        let s = self.state.read().unwrap_or_else(PoisonError::into_inner);
        s.explicit.iter().copied().collect()
    }
}
