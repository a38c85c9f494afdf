//! Runtime plumbing for Arbor nodes.
//!
//! Provides the single-slot [`Channel`] mailbox, the [`Cluster`] routing
//! table that resolves [`NodeHandle`](arbor_core::NodeHandle)s to live
//! nodes, per-kind call counters, and helpers for spawning and joining node
//! tasks on tokio.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod cluster;
pub mod counters;
pub mod sync;
pub mod task;

pub use channel::{AlreadySet, Channel, ChannelStats};
pub use cluster::{Cluster, FrameState, Locality};
pub use counters::{RpcCounters, RpcKind, RpcSnapshot, RPC_KINDS};
pub use task::{join_all, join_one, join_or_abort, spawn, BoxFuture};
