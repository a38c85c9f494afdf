//! Core types and traits for the Arbor octree framework.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by the rest of the workspace: octree geometry and
//! locations, node handles and links, the run configuration, the error
//! taxonomy, and the [`Subgrid`] collaborator trait.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod id;
pub mod link;
pub mod location;
pub mod subgrid;

pub use config::{RunConfig, MAX_CONFIG_LEVEL};
pub use error::{ConfigError, LocationError, ProtocolError, SubgridError};
pub use geometry::{
    Direction, DirectionKind, Face, Octant, NCHILD, NDIRECTION, NFACE, NIECES_PER_FACE,
};
pub use id::{Incarnation, LocalityId, NodeHandle};
pub use link::Link;
pub use location::{NodeLocation, MAX_LEVEL};
pub use subgrid::{
    FieldClass, OutputChunk, OutputList, ProlongRegion, Real, Subgrid, SubgridFactory,
};
