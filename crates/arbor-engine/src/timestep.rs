//! Global timestep selection.
//!
//! Ascend is a min-reduction over `local_timestep` slots: 0..8 hold the
//! children's subtree minima, slot 8 the node's own candidate. The root
//! then descends, filling every node's `global_timestep` before any node
//! reads it, so ascend and descend never interleave within a step.

use std::sync::Arc;

use arbor_core::{ProtocolError, Real, NCHILD};

use crate::error::EngineError;
use crate::node::{Node, SELF_SLOT};

impl Node {
    pub(crate) fn set_local_timestep(&self, slot: usize, dt: Real) -> Result<(), EngineError> {
        let Some(ch) = self.channels.local_timestep.get(slot) else {
            return Err(ProtocolError::InconsistentTopology {
                reason: format!("timestep slot {slot} out of range on {}", self.handle),
            }
            .into());
        };
        Ok(self.deliver(ch, dt, || format!("timestep[{slot}]"))?)
    }

    /// Store the chosen timestep and pass it down to every child.
    pub(crate) fn timestep_driver_descend(&self, dt: Real) -> Result<(), EngineError> {
        self.deliver(&self.channels.global_timestep, dt, || "global-timestep".into())?;
        if let Some(kids) = self.children() {
            for child in kids {
                self.client(child)?.timestep_driver_descend(dt)?;
            }
        }
        Ok(())
    }

    /// Reduce this subtree's candidates and forward the minimum upward; at
    /// the root, start the descent.
    pub(crate) async fn timestep_driver_ascend(
        self: &Arc<Self>,
        refined: bool,
    ) -> Result<(), EngineError> {
        let own = self.grid().max_timestep();
        self.set_local_timestep(SELF_SLOT, own)?;

        let slots = &self.channels.local_timestep;
        let mut dt = slots[SELF_SLOT].get().await;
        if refined {
            for ch in &slots[..NCHILD] {
                dt = dt.min(ch.get().await);
            }
        }

        match (self.parent(), self.octant()) {
            (Some(parent), Some(octant)) => {
                self.client(parent)?.set_local_timestep(octant.index(), dt)?
            }
            _ => self.timestep_driver_descend(dt)?,
        }
        Ok(())
    }

    /// Run one full reduction and return the timestep every node will use.
    pub(crate) async fn compute_timestep(self: &Arc<Self>, refined: bool) -> Result<Real, EngineError> {
        self.timestep_driver_ascend(refined).await?;
        Ok(self.channels.global_timestep.get().await)
    }
}
