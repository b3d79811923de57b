//! # rao-core: Remedial Action Optimisation data model
//!
//! Data structures shared by the linear range-action optimiser:
//!
//! - [`Instant`] / [`State`] - ordered grid timeline and (instant, contingency) states
//! - [`Cnec`] - a branch side monitored in one state against flow thresholds
//! - [`RangeAction`] - phase shifter, HVDC or injection shift with typed ranges
//! - [`OptimizationPerimeter`] - the immutable scope of one optimisation run,
//!   with its precomputed state-predecessor index
//!
//! ## Quick Start
//!
//! ```rust
//! use rao_core::*;
//!
//! let mut builder = PerimeterBuilder::new();
//! let preventive = builder.add_state(Instant::preventive(), None);
//! let curative = builder.add_state(Instant::curative(1), Some("co1"));
//!
//! builder.add_cnec(
//!     Cnec::new("line-a", curative)
//!         .with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
//! );
//! let hvdc = builder.add_range_action(RangeAction::hvdc("hvdc", -500.0, 500.0, 0.0));
//! builder.make_available(hvdc, preventive);
//!
//! let perimeter = builder.build().unwrap();
//! assert_eq!(perimeter.predecessor(curative), Some(preventive));
//! ```
//!
//! ## ID System
//!
//! States, cnecs and range actions are identified by dense `usize` newtypes
//! assigned by the [`PerimeterBuilder`]. They index the perimeter's tables and
//! the per-run setpoint arena.

use serde::{Deserialize, Serialize};

pub mod cnec;
pub mod error;
pub mod perimeter;
pub mod range_action;
pub mod state;
pub mod units;

pub use cnec::{BoundDirection, Cnec, FlowUnit, Side, Threshold};
pub use error::{RaoError, RaoResult};
pub use perimeter::{OptimizationPerimeter, PerimeterBuilder};
pub use range_action::{Range, RangeAction, RangeActionKind, RangeActionType, RangeType};
pub use state::{Instant, InstantKind, State};
pub use units::{Amperes, Kilovolts, Megawatts};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CnecId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeActionId(usize);

impl StateId {
    #[inline]
    pub fn new(value: usize) -> Self {
        StateId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl CnecId {
    #[inline]
    pub fn new(value: usize) -> Self {
        CnecId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl RangeActionId {
    #[inline]
    pub fn new(value: usize) -> Self {
        RangeActionId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}
