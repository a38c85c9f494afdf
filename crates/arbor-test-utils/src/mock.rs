//! Mock subgrid collaborator.
//!
//! State is four numbers: mass, elapsed time, the location key, and an
//! outflow tally. Every payload a mock produces is derived from its
//! location key, so a test can tell whose data arrived where.

use std::sync::{Arc, PoisonError, RwLock};

use arbor_core::{
    Direction, Face, FieldClass, NodeLocation, Octant, OutputChunk, ProlongRegion, Real, Subgrid,
    SubgridError, SubgridFactory, NCHILD, NIECES_PER_FACE,
};
use indexmap::IndexMap;

use crate::ledger::Ledger;
use crate::plan::RefinementPlan;

/// Number of state values per subgrid.
pub const STATE_LEN: usize = 4;
/// Byte length of every encoded mock subgrid.
pub const ENCODED_LEN: usize = 8 + 8 + 8 * STATE_LEN;

const MASS: usize = 0;
const ELAPSED: usize = 1;
const KEY: usize = 2;
const OUTFLOW: usize = 3;

#[derive(Debug)]
struct Shared {
    ledger: Arc<Ledger>,
    plan: RefinementPlan,
    timesteps: RwLock<IndexMap<NodeLocation, Real>>,
    default_dt: Real,
}

impl Shared {
    fn dt(&self, location: &NodeLocation) -> Real {
        let map = self.timesteps.read().unwrap_or_else(PoisonError::into_inner);
        map.get(location).copied().unwrap_or(self.default_dt)
    }
}

/// Factory for [`MockSubgrid`]s. Clones share the ledger, plan and
/// timestep table.
#[derive(Clone, Debug)]
pub struct MockFactory {
    shared: Arc<Shared>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new(RefinementPlan::none())
    }
}

impl MockFactory {
    /// Default timestep for locations without an override.
    pub const DEFAULT_DT: Real = 0.1;

    pub fn new(plan: RefinementPlan) -> Self {
        Self {
            shared: Arc::new(Shared {
                ledger: Arc::new(Ledger::new()),
                plan,
                timesteps: RwLock::new(IndexMap::new()),
                default_dt: Self::DEFAULT_DT,
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.shared.ledger
    }

    pub fn plan(&self) -> &RefinementPlan {
        &self.shared.plan
    }

    /// Make the subgrid at `location` report `dt` as its admissible step.
    pub fn set_timestep(&self, location: NodeLocation, dt: Real) {
        self.shared
            .timesteps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location, dt);
    }

    /// Initial state at `location`: mass splits evenly between children.
    pub fn initial_state(location: &NodeLocation) -> [Real; STATE_LEN] {
        let mut state = [0.0; STATE_LEN];
        state[MASS] = 0.125f64.powi(i32::from(location.level()));
        state[KEY] = location.key() as Real;
        state
    }

    fn build(&self, location: NodeLocation, state: [Real; STATE_LEN], steps: u64) -> MockSubgrid {
        MockSubgrid {
            location,
            shared: Arc::clone(&self.shared),
            state,
            steps,
        }
    }
}

impl SubgridFactory for MockFactory {
    fn create(&self, location: &NodeLocation) -> Box<dyn Subgrid> {
        Box::new(self.build(*location, Self::initial_state(location), 0))
    }

    fn decode(
        &self,
        location: &NodeLocation,
        bytes: &[u8],
    ) -> Result<Box<dyn Subgrid>, SubgridError> {
        if bytes.len() < ENCODED_LEN {
            return Err(SubgridError::Decode {
                reason: format!("{} bytes, need {ENCODED_LEN}", bytes.len()),
            });
        }
        let word = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            b
        };
        let key = u64::from_le_bytes(word(0));
        if key != location.key() {
            return Err(SubgridError::Decode {
                reason: format!("payload for key {key} loaded at {location}"),
            });
        }
        let steps = u64::from_le_bytes(word(1));
        let mut state = [0.0; STATE_LEN];
        for (i, v) in state.iter_mut().enumerate() {
            *v = f64::from_le_bytes(word(2 + i));
        }
        Ok(Box::new(self.build(*location, state, steps)))
    }

    fn max_encoded_len(&self) -> usize {
        ENCODED_LEN
    }
}

/// A subgrid that logs instead of computing.
#[derive(Debug)]
pub struct MockSubgrid {
    location: NodeLocation,
    shared: Arc<Shared>,
    state: [Real; STATE_LEN],
    steps: u64,
}

impl MockSubgrid {
    fn key(&self) -> Real {
        self.state[KEY]
    }

    fn log(&self, f: impl FnOnce(&mut crate::ledger::LocationLog)) {
        self.shared.ledger.record(self.location, f);
    }

    /// Flux correction this subgrid sends across `face`.
    pub fn flux_value(key: Real, face: Face) -> Real {
        key * 0.01 + face.index() as Real
    }
}

impl Subgrid for MockSubgrid {
    fn boundary(&self, _class: FieldClass, dir: Direction) -> Vec<Real> {
        vec![self.key(), dir.index() as Real]
    }

    fn set_boundary(&mut self, class: FieldClass, dir: Direction, _data: &[Real]) {
        self.log(|l| l.boundaries.push((class, dir)));
    }

    fn amr_boundary(&self, _class: FieldClass, face: Face, niece: usize) -> Vec<Real> {
        vec![self.key(), face.index() as Real, niece as Real]
    }

    fn set_niece_boundaries(
        &mut self,
        class: FieldClass,
        face: Face,
        _data: &[Vec<Real>; NIECES_PER_FACE],
    ) {
        self.log(|l| l.niece_faces.push((class, face)));
    }

    fn flux_correction(&self, class: FieldClass, face: Face) -> Vec<Real> {
        let v = Self::flux_value(self.key(), face);
        let out = vec![v, 2.0 * v];
        let sum: Real = out.iter().sum();
        self.log(|l| l.flux_sent.push((class, face, sum)));
        out
    }

    fn apply_flux_corrections(
        &mut self,
        class: FieldClass,
        face: Face,
        data: &[Vec<Real>; NIECES_PER_FACE],
    ) {
        let total: Real = data.iter().flatten().sum();
        self.log(|l| l.flux_applied.push((class, face, total)));
    }

    fn restrict(&self, _class: FieldClass) -> Vec<Real> {
        self.state.to_vec()
    }

    fn set_restricted(&mut self, class: FieldClass, octant: Octant, _data: &[Real]) {
        self.log(|l| l.restricted.push((class, octant)));
    }

    fn multipoles(&mut self, children: Option<&[Vec<Real>; NCHILD]>) -> Vec<Real> {
        let mass = match children {
            Some(kids) => kids.iter().filter_map(|m| m.first()).sum(),
            None => self.state[MASS],
        };
        vec![mass]
    }

    fn gravity_boundary(&self, _dir: Direction) -> Vec<Real> {
        vec![self.state[MASS]]
    }

    fn set_gravity_boundary(&mut self, dir: Direction, _data: &[Real], is_monopole: bool) {
        self.log(|l| l.gravity.push((dir, is_monopole)));
    }

    fn expansions(&mut self, parent: Option<&[Real]>) -> [Vec<Real>; NCHILD] {
        self.log(|l| l.expansions.push(parent.is_some()));
        let base = parent.and_then(|p| p.first().copied()).unwrap_or(0.0);
        std::array::from_fn(|i| vec![base + i as Real])
    }

    fn max_timestep(&self) -> Real {
        self.shared.dt(&self.location)
    }

    fn advance(&mut self, dt: Real) {
        self.state[ELAPSED] += dt;
        self.steps += 1;
        self.log(|l| l.advances.push(dt));
    }

    fn wants_refinement(&self, _level: u8) -> bool {
        self.shared.plan.wants(&self.location)
    }

    fn set_leaf(&mut self, leaf: bool) {
        self.log(|l| l.leaf = Some(leaf));
    }

    fn prolong(&self, _class: FieldClass, region: &ProlongRegion) -> Vec<Real> {
        let mut data = self.state.to_vec();
        data[MASS] /= NCHILD as Real;
        data.push(region.volume() as Real);
        data
    }

    fn set_prolong(&mut self, class: FieldClass, data: &[Real], outflows: &[Real]) {
        if class == FieldClass::Hydro {
            for (dst, src) in self.state.iter_mut().zip(data).take(ELAPSED + 1) {
                *dst = *src;
            }
            self.state[OUTFLOW] = outflows.first().copied().unwrap_or(0.0);
        }
        self.log(|l| l.prolonged.push(class));
    }

    fn outflows(&self) -> Vec<Real> {
        vec![self.state[OUTFLOW]]
    }

    fn output(&self) -> OutputChunk {
        OutputChunk {
            location: self.location,
            data: self.state.to_vec(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_LEN);
        out.extend_from_slice(&self.location.key().to_le_bytes());
        out.extend_from_slice(&self.steps.to_le_bytes());
        for v in self.state {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }
}
