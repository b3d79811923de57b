//! # rao-algo: iterating linear optimisation of range actions
//!
//! Chooses setpoints for phase shifters, HVDC links and injection shifts so
//! that the worst margin over the critical network elements is maximised.
//! The network is linearised around a working point by an external
//! [`SensitivityEngine`]; a linear problem is built from that linearization,
//! solved, and the resulting setpoints are re-evaluated on true flows.
//!
//! ## Pipeline
//!
//! | Step | Module |
//! |------|--------|
//! | Resolve admissible setpoint intervals | [`admissibility`] |
//! | Write variables, constraints and objective | [`fillers`] into a [`linear_problem::LinearProblem`] |
//! | Solve through good_lp | [`linear_problem::GoodLpBackend`] |
//! | Round and re-evaluate on true flows | [`rounding`], [`objective`] |
//! | Accept, roll back or stop | [`controller`] |
//!
//! ## Example
//!
//! ```rust
//! use rao_algo::test_utils::SyntheticEngine;
//! use rao_algo::*;
//! use rao_core::*;
//!
//! let mut builder = PerimeterBuilder::new();
//! let state = builder.add_state(Instant::preventive(), None);
//! let line = builder.add_cnec(
//!     Cnec::new("line", state).with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
//! );
//! let hvdc = builder.add_range_action(RangeAction::hvdc("hvdc", 0.0, 50.0, 0.0));
//! builder.make_available(hvdc, state);
//! let perimeter = builder.build().unwrap();
//!
//! let mut engine = SyntheticEngine::new()
//!     .with_flow(line, Side::One, 120.0)
//!     .with_sensitivity(line, Side::One, hvdc, -1.0);
//! let parameters = LinearOptimizerParameters::default();
//! let result = IteratingLinearOptimizer::optimize(
//!     LinearOptimizerInput {
//!         perimeter: &perimeter,
//!         parameters: &parameters,
//!         initial_linearization: None,
//!         deadline: None,
//!     },
//!     &mut engine,
//!     &GoodLpBackend::default(),
//! )
//! .unwrap();
//! assert_eq!(result.status, LinearOptimizationStatus::Feasible);
//! assert!(result.objective.worst_margin.unwrap() > 0.0);
//! ```

pub mod admissibility;
pub mod controller;
pub mod fillers;
pub mod linear_problem;
pub mod objective;
pub mod parallel;
pub mod parameters;
pub mod report;
pub mod rounding;
pub mod sensitivity;
pub mod setpoints;
pub mod test_utils;

pub use admissibility::{AdmissibilityResolver, AdmissibleRange, AdmissibleRanges, RangeInfeasibility};
pub use controller::{
    ControllerState, IteratingLinearOptimizer, IterationRecord, LinearOptimizationResult,
    LinearOptimizationStatus, LinearOptimizerInput,
};
pub use fillers::{fillers_for, FillContext, ProblemFiller};
pub use linear_problem::{GoodLpBackend, LinearProblem, LinearProblemStatus, LpBackend, LpSolverKind};
pub use objective::{ObjectiveFunction, ObjectiveValue};
pub use parallel::{optimize_perimeters, PerimeterJob, PerimeterOutcome};
pub use parameters::{LinearOptimizerParameters, ObjectiveKind, RaUsageLimits};
pub use report::OptimizationReport;
pub use sensitivity::{ComputationStatus, LinearizationPoint, SensitivityEngine};
pub use setpoints::SetpointAssignment;
