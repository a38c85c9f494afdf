//! Test utilities and mock types for Arbor development.
//!
//! [`MockFactory`] builds [`MockSubgrid`]s that do no numerics but log
//! every collaborator call into a shared [`Ledger`], so tests can check
//! what the coordination layer moved where. Refinement decisions come from
//! a mutable [`RefinementPlan`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod ledger;
pub mod mock;
pub mod plan;

pub use ledger::{Ledger, LocationLog};
pub use mock::{MockFactory, MockSubgrid, ENCODED_LEN, STATE_LEN};
pub use plan::RefinementPlan;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

static SCRATCH: AtomicU32 = AtomicU32::new(0);

/// A fresh path in the system temp directory, unique within this process.
pub fn scratch_path(tag: &str) -> PathBuf {
    let n = SCRATCH.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("arbor_{}_{n}_{tag}.chk", std::process::id()))
}
