//! Boundary, flux-correction and restriction exchange.
//!
//! Per field class, one step moves data along four paths:
//!
//! ```text
//! same level     node ──boundary(d)──────────▶ neighbor in d
//! fine → coarse  niece ──boundary(face)──────▶ aunt      (4 per aunt face)
//! coarse → fine  aunt ──amr_boundary(face,i)─▶ niece i   (into the niece's
//!                                                         Coarser direction)
//! after advance  niece ──flux_correction─────▶ aunt      (4 per aunt face)
//!                child ──restrict────────────▶ parent    (8 per parent)
//! ```
//!
//! Every path writes into a dedicated single-slot channel on the receiver,
//! so each channel sees exactly one set and one get per step. Directions
//! with a `DomainEdge` link, and `Coarser` links with no aunt (edge and
//! vertex directions), are never sent to nor awaited. Regrid keeps the
//! tree 2:1 balanced, which [`TreeCensus`](crate::TreeCensus) verifies.

use std::sync::Arc;

use arbor_core::{Direction, Face, FieldClass, Link, Octant, ProtocolError, Real, NIECES_PER_FACE};
use arbor_runtime::Channel;
use tracing::trace;

use crate::error::EngineError;
use crate::node::Node;

async fn take_four(chans: &[Channel<Vec<Real>>; NIECES_PER_FACE]) -> [Vec<Real>; NIECES_PER_FACE] {
    let mut out: [Vec<Real>; NIECES_PER_FACE] = Default::default();
    for (slot, ch) in out.iter_mut().zip(chans.iter()) {
        *slot = ch.get().await;
    }
    out
}

/// Index of a niece on its aunt's `face`, given the niece's octant.
fn niece_slot(aunt_face: Face, octant: Octant) -> Result<usize, EngineError> {
    aunt_face
        .opposite()
        .niece_index(octant)
        .ok_or_else(|| {
            ProtocolError::InconsistentTopology {
                reason: format!("octant {octant} does not touch face {}", aunt_face.opposite()),
            }
            .into()
        })
}

impl Node {
    // ── Receivers ───────────────────────────────────────────────

    pub(crate) fn recv_boundary(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        dir: Direction,
    ) -> Result<(), EngineError> {
        let ch = &self.channels.sibling(class)[dir.index()];
        Ok(self.deliver(ch, data, || format!("{class}{dir}"))?)
    }

    pub(crate) fn recv_niece_boundary(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        let slot = niece_slot(face, octant)?;
        let ch = &self.channels.nieces(class)[face.index()][slot];
        Ok(self.deliver(ch, data, || format!("{class}-niece{face}[{slot}]"))?)
    }

    pub(crate) fn recv_flux_correct(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        face: Face,
        octant: Octant,
    ) -> Result<(), EngineError> {
        let slot = niece_slot(face, octant)?;
        let ch = &self.channels.niece_flux(class)[face.index()][slot];
        Ok(self.deliver(ch, data, || format!("{class}-flux{face}[{slot}]"))?)
    }

    pub(crate) fn recv_children(
        &self,
        class: FieldClass,
        data: Vec<Real>,
        octant: Octant,
    ) -> Result<(), EngineError> {
        let ch = &self.channels.children(class)[octant.index()];
        Ok(self.deliver(ch, data, || format!("{class}-child[{octant}]"))?)
    }

    // ── Boundary exchange ───────────────────────────────────────

    /// Send this node's boundary data for `class` along every live path,
    /// then wait for and merge every inbound slab.
    pub(crate) async fn exchange_boundaries(
        self: &Arc<Self>,
        class: FieldClass,
    ) -> Result<(), EngineError> {
        let family = self.family().clone();
        let octant = self.octant();

        // Same level.
        for dir in Direction::ALL {
            if let Link::Present(h) = family.neighbors[dir.index()] {
                let data = self.grid().boundary(class, dir);
                self.client(h)?.recv_boundary(class, data, dir.opposite())?;
            }
        }

        // Fine to coarse.
        if let Some(octant) = octant {
            for face in Face::ALL {
                if let Some(aunt) = family.aunts[face.index()] {
                    let data = self.grid().boundary(class, face.to_direction());
                    self.client(aunt)?
                        .recv_niece_boundary(class, data, face.opposite(), octant)?;
                }
            }
        }

        // Coarse to fine.
        for face in Face::ALL {
            let into = face.opposite().to_direction();
            for (i, niece) in family.nieces[face.index()].iter().enumerate() {
                let data = self.grid().amr_boundary(class, face, i);
                self.client(*niece)?.recv_boundary(class, data, into)?;
            }
        }

        // Await.
        let inbox = self.channels.sibling(class);
        for dir in Direction::ALL {
            let expected = match family.neighbors[dir.index()] {
                Link::Present(_) => true,
                Link::Coarser => dir
                    .to_face()
                    .is_some_and(|f| family.aunts[f.index()].is_some()),
                Link::DomainEdge => false,
            };
            if expected {
                let data = inbox[dir.index()].get().await;
                self.grid().set_boundary(class, dir, &data);
            }
        }
        for face in Face::ALL {
            if family.nieces[face.index()].is_empty() {
                continue;
            }
            let data = take_four(&self.channels.nieces(class)[face.index()]).await;
            self.grid().set_niece_boundaries(class, face, &data);
        }
        trace!(node = %self.handle, %class, "boundaries exchanged");
        Ok(())
    }

    // ── Flux correction ─────────────────────────────────────────

    /// Send flux corrections to every aunt and apply those from every
    /// niece face.
    pub(crate) async fn exchange_flux_corrections(
        self: &Arc<Self>,
        class: FieldClass,
    ) -> Result<(), EngineError> {
        let family = self.family().clone();
        if let Some(octant) = self.octant() {
            for face in Face::ALL {
                if let Some(aunt) = family.aunts[face.index()] {
                    let data = self.grid().flux_correction(class, face);
                    self.client(aunt)?
                        .recv_flux_correct(class, data, face.opposite(), octant)?;
                }
            }
        }
        for face in Face::ALL {
            if family.nieces[face.index()].is_empty() {
                continue;
            }
            let data = take_four(&self.channels.niece_flux(class)[face.index()]).await;
            self.grid().apply_flux_corrections(class, face, &data);
        }
        Ok(())
    }

    // ── Interlevel restriction ──────────────────────────────────

    /// Send restricted data to the parent and merge the children's.
    pub(crate) async fn exchange_restriction(
        self: &Arc<Self>,
        class: FieldClass,
        refined: bool,
    ) -> Result<(), EngineError> {
        if let (Some(parent), Some(octant)) = (self.parent(), self.octant()) {
            let data = self.grid().restrict(class);
            self.client(parent)?.recv_children(class, data, octant)?;
        }
        if refined {
            let inbox = self.channels.children(class);
            for octant in Octant::ALL {
                let data = inbox[octant.index()].get().await;
                self.grid().set_restricted(class, octant, &data);
            }
        }
        Ok(())
    }
}
