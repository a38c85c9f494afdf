//! Distributed octree coordination.
//!
//! A [`Simulation`] is a tree of [`Node`]s spread over the localities of a
//! [`Cluster`](arbor_runtime::Cluster). Nodes reach each other only through
//! handles resolved by the routing table, and exchange data only through
//! single-slot channels. This crate implements the protocols that run over
//! that substrate:
//!
//! - tree formation (parent, neighbor, aunt and niece wiring)
//! - per-step boundary, flux-correction and restriction exchange
//! - the gravity up/down sweep
//! - global timestep reduction
//! - regrid (refinement votes, gather, scatter, migration)
//! - checkpoint save/load and output collection
//!
//! Subgrid numerics are supplied by the caller through
//! [`SubgridFactory`](arbor_core::SubgridFactory).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod census;
pub mod client;
pub mod error;
pub mod metrics;
pub mod node;
pub mod persist;
pub mod simulation;

mod exchange;
mod gravity;
mod regrid;
mod step;
mod timestep;
mod topology;

pub use census::TreeCensus;
pub use client::{NodeClient, RemoteCall};
pub use error::EngineError;
pub use metrics::{RegridMetrics, StepMetrics};
pub use node::{Clock, Node};
pub use persist::{LoadContext, LoadOutcome, SaveTarget};
pub use simulation::Simulation;
