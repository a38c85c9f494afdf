//! Umbrella error for engine operations.

use arbor_checkpoint::CheckpointError;
use arbor_core::{ConfigError, LocationError, ProtocolError, SubgridError};
use thiserror::Error;

/// Any failure of a tree-wide operation.
///
/// Nothing is retried: every variant aborts the current step, regrid, save
/// or load, and the first error collected from a node's children is the one
/// reported.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Inter-node protocol violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Invalid octree addressing.
    #[error(transparent)]
    Location(#[from] LocationError),
    /// Subgrid collaborator failure.
    #[error(transparent)]
    Subgrid(#[from] SubgridError),
    /// Invalid run configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Checkpoint I/O or corruption.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
