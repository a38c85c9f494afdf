//! One simulation step over a subtree.
//!
//! Every node runs the same phase sequence; a node's children run theirs
//! concurrently on their own tasks. Phases within one node are strictly
//! ordered:
//!
//! 1. boundary exchange per field class
//! 2. gravity solve (if enabled)
//! 3. timestep reduction
//! 4. leaves advance
//! 5. flux correction per field class
//! 6. restriction per field class
//! 7. clock update

use std::sync::Arc;

use arbor_core::Real;
use arbor_runtime::sync::lock;
use arbor_runtime::{join_or_abort, BoxFuture};
use tracing::trace;

use crate::error::EngineError;
use crate::node::Node;

impl Node {
    /// Advance this subtree by one step, returning the timestep used.
    pub(crate) fn step(self: Arc<Self>) -> BoxFuture<'static, Result<Real, EngineError>> {
        Box::pin(async move {
            let kids = self.children();
            let mut calls = Vec::new();
            if let Some(kids) = kids {
                for child in kids {
                    calls.push(self.client(child)?.step()?);
                }
            }
            let (dt, _) = join_or_abort(self.step_local(kids.is_some()), calls).await?;
            Ok(dt)
        })
    }

    async fn step_local(self: &Arc<Self>, refined: bool) -> Result<Real, EngineError> {
        let classes: Vec<_> = self.config.exchanged_classes().collect();

        for &class in &classes {
            self.exchange_boundaries(class).await?;
        }
        if self.config.gravity_on {
            self.compute_fmm(refined).await?;
        }

        let dt = self.compute_timestep(refined).await?;
        if !refined {
            self.grid().advance(dt);
        }

        for &class in &classes {
            self.exchange_flux_corrections(class).await?;
        }
        for &class in &classes {
            self.exchange_restriction(class, refined).await?;
        }

        let omega = self.cluster()?.frame(self.handle.locality)?.omega;
        let mut clock = lock(&self.clock);
        clock.current_time += dt;
        clock.rotational_time += omega * dt;
        clock.step_num += 1;
        trace!(node = %self.handle, dt, step = clock.step_num, "stepped");
        Ok(dt)
    }
}
