//! The subgrid collaborator.
//!
//! A [`Subgrid`] owns the physical field data of one node's cubic patch.
//! The coordination layer never inspects field values: it asks the subgrid
//! for opaque buffers, ships them to other nodes, and hands them back.
//! Numerical kernels (reconstruction, fluxes, multipole interactions,
//! interpolation) live entirely behind this trait.

use std::fmt;

use crate::error::SubgridError;
use crate::geometry::{Direction, Face, Octant, NCHILD, NIECES_PER_FACE};
use crate::location::NodeLocation;

/// Scalar type of every field buffer.
pub type Real = f64;

/// Which family of fields a boundary, flux or restriction buffer carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldClass {
    /// Hydrodynamic state.
    Hydro,
    /// Radiation state.
    Radiation,
}

impl fmt::Display for FieldClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldClass::Hydro => write!(f, "hydro"),
            FieldClass::Radiation => write!(f, "rad"),
        }
    }
}

/// Cell-index box in a parent subgrid (ghosts included) from which a new
/// child's interior is interpolated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProlongRegion {
    /// Inclusive lower corner.
    pub lb: [usize; 3],
    /// Exclusive upper corner.
    pub ub: [usize; 3],
}

impl ProlongRegion {
    /// Region of the parent that covers child `octant`.
    ///
    /// The parent array includes `ghost_width` ghost cells per side; each
    /// child covers half the interior along every axis, and the region is
    /// widened by one ghost layer on each side for the interpolation stencil.
    pub fn for_octant(octant: Octant, ghost_width: usize, interior: usize) -> Self {
        let half = interior / 2;
        let mut lb = [0; 3];
        let mut ub = [0; 3];
        for axis in 0..3 {
            lb[axis] = ghost_width / 2 + usize::from(octant.bit(axis)) * half;
            ub[axis] = lb[axis] + half + ghost_width;
        }
        Self { lb, ub }
    }

    /// Number of cells inside the region.
    pub fn volume(&self) -> usize {
        (0..3).map(|a| self.ub[a] - self.lb[a]).product()
    }
}

/// One leaf's contribution to a tree-wide output list.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputChunk {
    /// The producing node.
    pub location: NodeLocation,
    /// Opaque output data.
    pub data: Vec<Real>,
}

/// Output of a whole tree, leaves in depth-first octant order.
pub type OutputList = Vec<OutputChunk>;

/// Field data of one node.
///
/// All buffers are opaque to the caller. Methods that take `&mut self`
/// are only invoked by the owning node while it holds the subgrid lock.
pub trait Subgrid: Send {
    /// Boundary slab this node sends to the same-level neighbor in `dir`.
    fn boundary(&self, class: FieldClass, dir: Direction) -> Vec<Real>;

    /// Fill the ghost layer facing `dir` from a received slab.
    fn set_boundary(&mut self, class: FieldClass, dir: Direction, data: &[Real]);

    /// Prolonged ghost slab for the finer neighbor at position `niece` on
    /// `face` (coarse-to-fine ghost fill).
    fn amr_boundary(&self, class: FieldClass, face: Face, niece: usize) -> Vec<Real>;

    /// Merge the four finer boundary slabs covering `face` into this node's
    /// ghost layer.
    fn set_niece_boundaries(
        &mut self,
        class: FieldClass,
        face: Face,
        data: &[Vec<Real>; NIECES_PER_FACE],
    );

    /// Face flux accumulated during the last advance, for a coarser neighbor.
    fn flux_correction(&self, class: FieldClass, face: Face) -> Vec<Real>;

    /// Replace this node's flux through `face` with the four finer
    /// contributions covering it.
    fn apply_flux_corrections(
        &mut self,
        class: FieldClass,
        face: Face,
        data: &[Vec<Real>; NIECES_PER_FACE],
    );

    /// Interior averaged down by a factor of two, for the parent.
    fn restrict(&self, class: FieldClass) -> Vec<Real>;

    /// Overwrite the octant of the interior covered by a child with that
    /// child's restricted data.
    fn set_restricted(&mut self, class: FieldClass, octant: Octant, data: &[Real]);

    /// Compute this node's multipole moments, from its own mass for a leaf
    /// or from the children's moments for a refined node.
    fn multipoles(&mut self, children: Option<&[Vec<Real>; NCHILD]>) -> Vec<Real>;

    /// Gravity data sent to the same-level neighbor in `dir`.
    fn gravity_boundary(&self, dir: Direction) -> Vec<Real>;

    /// Store a neighbor's gravity data. `is_monopole` is set when the
    /// sender is a leaf.
    fn set_gravity_boundary(&mut self, dir: Direction, data: &[Real], is_monopole: bool);

    /// Compute local expansions from the parent's (absent at the root) and
    /// return the eight child expansions. Leaves may return empty buffers.
    fn expansions(&mut self, parent: Option<&[Real]>) -> [Vec<Real>; NCHILD];

    /// Largest stable timestep for this subgrid.
    fn max_timestep(&self) -> Real;

    /// Advance the field data by `dt`.
    fn advance(&mut self, dt: Real);

    /// Whether the refinement criteria want this subgrid refined.
    fn wants_refinement(&self, level: u8) -> bool;

    /// Mark the subgrid as a leaf or refined.
    fn set_leaf(&mut self, leaf: bool);

    /// Interpolated `class` data for a new child covering `region`.
    fn prolong(&self, class: FieldClass, region: &ProlongRegion) -> Vec<Real>;

    /// Initialize the `class` fields from prolonged parent data. `outflows`
    /// is only non-empty for hydro.
    fn set_prolong(&mut self, class: FieldClass, data: &[Real], outflows: &[Real]);

    /// Conserved quantities that have left the domain.
    fn outflows(&self) -> Vec<Real>;

    /// This node's output chunk.
    fn output(&self) -> OutputChunk;

    /// Serialize the full field state.
    fn encode(&self) -> Vec<u8>;
}

/// Creates and decodes subgrids. Shared by every node of a run.
pub trait SubgridFactory: Send + Sync {
    /// A fresh subgrid holding the initial condition at `location`.
    fn create(&self, location: &NodeLocation) -> Box<dyn Subgrid>;

    /// Rebuild a subgrid from [`Subgrid::encode`] output. Trailing zero
    /// padding after the encoded bytes must be tolerated.
    fn decode(
        &self,
        location: &NodeLocation,
        bytes: &[u8],
    ) -> Result<Box<dyn Subgrid>, SubgridError>;

    /// Upper bound on the length of [`Subgrid::encode`] output, used to size
    /// checkpoint records.
    fn max_encoded_len(&self) -> usize;
}
