//! Gravity: neighbor exchange plus one up-then-down tree sweep.
//!
//! Multipoles flow up (a refined node blocks on all 8 children before
//! forming its own moment), expansions flow down (a node blocks on its
//! parent's expansion before producing its children's). Same-level
//! neighbors swap gravity boundary data between the two sweeps; a leaf's
//! payload is flagged as a monopole.

use std::sync::Arc;

use arbor_core::{Direction, Link, Octant, Real, NCHILD};
use arbor_runtime::{join_or_abort, BoxFuture};
use tracing::trace;

use crate::error::EngineError;
use crate::node::{GravityBoundary, Node};

impl Node {
    pub(crate) fn recv_gravity_boundary(
        &self,
        data: Vec<Real>,
        dir: Direction,
        is_monopole: bool,
    ) -> Result<(), EngineError> {
        let ch = &self.channels.neighbor_gravity[dir.index()];
        let value = GravityBoundary { data, is_monopole };
        Ok(self.deliver(ch, value, || format!("gravity{dir}"))?)
    }

    pub(crate) fn recv_gravity_multipoles(
        &self,
        data: Vec<Real>,
        octant: Octant,
    ) -> Result<(), EngineError> {
        let ch = &self.channels.child_multipoles[octant.index()];
        Ok(self.deliver(ch, data, || format!("multipole[{octant}]"))?)
    }

    pub(crate) fn recv_gravity_expansions(&self, data: Vec<Real>) -> Result<(), EngineError> {
        Ok(self.deliver(&self.channels.parent_expansion, data, || "expansion".into())?)
    }

    /// Solve gravity over this node's subtree.
    pub(crate) fn solve_gravity(self: Arc<Self>) -> BoxFuture<'static, Result<(), EngineError>> {
        Box::pin(async move {
            let kids = self.children();
            let mut calls = Vec::new();
            if let Some(kids) = kids {
                for child in kids {
                    calls.push(self.client(child)?.solve_gravity()?);
                }
            }
            join_or_abort(self.compute_fmm(kids.is_some()), calls).await?;
            Ok(())
        })
    }

    /// This node's share of one gravity solve.
    pub(crate) async fn compute_fmm(self: &Arc<Self>, refined: bool) -> Result<(), EngineError> {
        let family = self.family().clone();

        // Up.
        let child_moments = if refined {
            let mut moments: [Vec<Real>; NCHILD] = Default::default();
            for (slot, ch) in moments.iter_mut().zip(self.channels.child_multipoles.iter()) {
                *slot = ch.get().await;
            }
            Some(moments)
        } else {
            None
        };
        let moments = self.grid().multipoles(child_moments.as_ref());
        if let (Some(parent), Some(octant)) = (family.parent, self.octant()) {
            self.client(parent)?.recv_gravity_multipoles(moments, octant)?;
        }

        // Across.
        for dir in Direction::ALL {
            if let Link::Present(h) = family.neighbors[dir.index()] {
                let data = self.grid().gravity_boundary(dir);
                self.client(h)?
                    .recv_gravity_boundary(data, dir.opposite(), !refined)?;
            }
        }
        for dir in Direction::ALL {
            if family.neighbors[dir.index()].is_present() {
                let b = self.channels.neighbor_gravity[dir.index()].get().await;
                self.grid().set_gravity_boundary(dir, &b.data, b.is_monopole);
            }
        }

        // Down.
        let parent_expansion = if family.parent.is_some() {
            Some(self.channels.parent_expansion.get().await)
        } else {
            None
        };
        let expansions = self.grid().expansions(parent_expansion.as_deref());
        if refined {
            if let Some(kids) = self.children() {
                for (child, data) in kids.into_iter().zip(expansions) {
                    self.client(child)?.recv_gravity_expansions(data)?;
                }
            }
        }
        trace!(node = %self.handle, "gravity solved");
        Ok(())
    }
}
