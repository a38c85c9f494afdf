//! Error types shared across the Arbor workspace.
//!
//! Organized by subsystem: octree addressing, the inter-node protocol,
//! subgrid payload decoding, and run configuration. Checkpoint I/O errors
//! live in `arbor-checkpoint`; the engine wraps everything in its own
//! umbrella error.

use thiserror::Error;

use crate::id::NodeHandle;

/// Invalid octree addressing.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Octant index outside `0..8`.
    #[error("octant index {index} out of range 0..8")]
    InvalidOctant {
        /// The rejected index.
        index: u8,
    },
    /// Face index outside `0..6`.
    #[error("face index {index} out of range 0..6")]
    InvalidFace {
        /// The rejected index.
        index: u8,
    },
    /// Direction index outside `0..26`.
    #[error("direction index {index} out of range 0..26")]
    InvalidDirection {
        /// The rejected index.
        index: u8,
    },
    /// Offset triple is zero or has a component outside `-1..=1`.
    #[error("invalid neighbor offset {offset:?}")]
    InvalidOffset {
        /// The rejected offset.
        offset: [i8; 3],
    },
    /// Level exceeds the deepest representable level.
    #[error("level {level} exceeds the maximum refinement depth")]
    LevelOverflow {
        /// The requested level.
        level: u8,
    },
    /// A coordinate lies outside `0..2^level`.
    #[error("coordinates {coords:?} out of range at level {level}")]
    CoordinatesOutOfRange {
        /// Level of the rejected location.
        level: u8,
        /// The rejected coordinates.
        coords: [u32; 3],
    },
    /// A locational code with no valid sentinel bit.
    #[error("invalid locational key {key:#x}")]
    InvalidKey {
        /// The rejected key.
        key: u64,
    },
}

/// Violations of the inter-node protocol.
///
/// Every variant is fatal for the current step or regrid. Nothing in the
/// coordination layer retries; recovery is by restarting from a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A handle no longer resolves: the node was dropped or migrated and
    /// topology was not rebuilt.
    #[error("stale handle {handle}")]
    StaleHandle {
        /// The handle that failed to resolve.
        handle: NodeHandle,
    },
    /// A handle names a locality that does not exist.
    #[error("unknown locality {locality}")]
    UnknownLocality {
        /// The out-of-range locality index.
        locality: u32,
    },
    /// A second value was delivered to a channel before the first was
    /// consumed.
    #[error("channel {channel} on {node} already set")]
    ChannelAlreadySet {
        /// Which channel (e.g. `hydro(+x)`).
        channel: String,
        /// The receiving node.
        node: NodeHandle,
    },
    /// The tree shape or relation set contradicts itself.
    #[error("inconsistent topology: {reason}")]
    InconsistentTopology {
        /// What was found.
        reason: String,
    },
    /// The runtime hosting the cluster has gone away.
    #[error("runtime shut down")]
    RuntimeShutDown,
    /// A spawned node task panicked or was cancelled.
    #[error("node task failed: {reason}")]
    TaskFailed {
        /// Panic or cancellation message.
        reason: String,
    },
}

/// Failures of the subgrid collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubgridError {
    /// Encoded subgrid bytes could not be decoded.
    #[error("cannot decode subgrid payload: {reason}")]
    Decode {
        /// Why decoding failed.
        reason: String,
    },
}

/// Invalid [`RunConfig`](crate::RunConfig).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// At least one locality is required.
    #[error("locality count must be at least 1")]
    NoLocalities,
    /// `max_level` is deeper than the tree can address.
    #[error("max_level {requested} exceeds the limit {limit}")]
    MaxLevelTooDeep {
        /// The configured value.
        requested: u8,
        /// The deepest allowed value.
        limit: u8,
    },
    /// Subgrid interior width must be a positive even number.
    #[error("subgrid width {width} must be positive and even")]
    InvalidSubgridWidth {
        /// The configured width.
        width: usize,
    },
}
