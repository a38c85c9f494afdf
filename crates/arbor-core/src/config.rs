//! Run configuration.
//!
//! [`RunConfig`] replaces process-wide physics switches with one immutable
//! value that is `Arc`-shared by every node. [`validate()`](RunConfig::validate)
//! checks structural invariants once at startup.

use std::time::Duration;

use crate::error::ConfigError;
use crate::location::MAX_LEVEL;
use crate::subgrid::FieldClass;

/// Deepest `max_level` a run may request. One level below the addressing
/// limit so that nodes at `max_level` can still be given children during a
/// forced 2:1 balance.
pub const MAX_CONFIG_LEVEL: u8 = MAX_LEVEL - 1;

// ── RunConfig ──────────────────────────────────────────────────────

/// Immutable per-run settings propagated to every node.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Run the hydro boundary exchange, flux correction and restriction.
    pub hydro_on: bool,
    /// Run the gravity multipole/expansion pass.
    pub gravity_on: bool,
    /// Run the radiation boundary exchange, flux correction and restriction.
    pub radiation_on: bool,
    /// Number of worker processes ("localities"). Default: 1.
    pub localities: u32,
    /// Deepest refinement level the criteria may request. Default: 4.
    pub max_level: u8,
    /// Interior cells per axis of each subgrid (INX). Default: 8.
    pub subgrid_width: usize,
    /// Ghost layer width for hydro fields. Default: 2.
    pub hydro_ghost_width: usize,
    /// Ghost layer width for radiation fields. Default: 1.
    pub rad_ghost_width: usize,
    /// Delay before aborting on checkpoint corruption, so logs can flush.
    /// Default: 10 s.
    pub fatal_grace: Duration,
    /// Abort the process on fatal corruption instead of returning the error.
    /// Default: true.
    pub abort_on_fatal: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hydro_on: true,
            gravity_on: true,
            radiation_on: false,
            localities: 1,
            max_level: 4,
            subgrid_width: 8,
            hydro_ghost_width: 2,
            rad_ghost_width: 1,
            fatal_grace: Duration::from_secs(10),
            abort_on_fatal: true,
        }
    }
}

impl RunConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.localities == 0 {
            return Err(ConfigError::NoLocalities);
        }
        if self.max_level > MAX_CONFIG_LEVEL {
            return Err(ConfigError::MaxLevelTooDeep {
                requested: self.max_level,
                limit: MAX_CONFIG_LEVEL,
            });
        }
        if self.subgrid_width == 0 || self.subgrid_width % 2 != 0 {
            return Err(ConfigError::InvalidSubgridWidth {
                width: self.subgrid_width,
            });
        }
        Ok(())
    }

    /// Set the physics switches.
    pub fn with_physics(mut self, hydro: bool, gravity: bool, radiation: bool) -> Self {
        self.hydro_on = hydro;
        self.gravity_on = gravity;
        self.radiation_on = radiation;
        self
    }

    /// Set the number of localities.
    pub fn with_localities(mut self, localities: u32) -> Self {
        self.localities = localities;
        self
    }

    /// Set the deepest allowed refinement level.
    pub fn with_max_level(mut self, max_level: u8) -> Self {
        self.max_level = max_level;
        self
    }

    /// Set the subgrid interior width.
    pub fn with_subgrid_width(mut self, width: usize) -> Self {
        self.subgrid_width = width;
        self
    }

    /// Configure fatal-corruption handling.
    pub fn with_fatal_policy(mut self, abort: bool, grace: Duration) -> Self {
        self.abort_on_fatal = abort;
        self.fatal_grace = grace;
        self
    }

    /// Ghost width used for a field class.
    pub fn ghost_width(&self, class: FieldClass) -> usize {
        match class {
            FieldClass::Hydro => self.hydro_ghost_width,
            FieldClass::Radiation => self.rad_ghost_width,
        }
    }

    /// Field classes whose boundary exchange is enabled, in exchange order.
    pub fn exchanged_classes(&self) -> impl Iterator<Item = FieldClass> + '_ {
        [
            (self.hydro_on, FieldClass::Hydro),
            (self.radiation_on, FieldClass::Radiation),
        ]
        .into_iter()
        .filter_map(|(on, class)| on.then_some(class))
    }
}
