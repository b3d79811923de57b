//! Problem fillers: each one writes its variables, constraints and objective
//! terms into the shared [`LinearProblem`].
//!
//! Fillers are stateless. Everything they read comes from a [`FillContext`],
//! rebuilt by the controller for each iteration. Shared auxiliary variables
//! (flows, minimum margin) are created on first reference and constraints are
//! presence-checked, so fillers can be applied in any order.
//!
//! | Filler | Adds |
//! |--------|------|
//! | [`CoreProblemFiller`] | flow definitions, setpoints, absolute variations, range shrinking |
//! | [`MaxMinMarginFiller`] | worst absolute margin |
//! | [`MaxMinRelativeMarginFiller`] | worst PTDF-normalised margin (MILP) |
//! | [`RangeActionPenaltyFiller`] | setpoint change penalties |
//! | [`MaxLoopFlowFiller`] | loop-flow limits with violation costs |
//! | [`MnecFiller`] | margin-decrease limits on monitored-only cnecs |
//! | [`RaUsageLimitsFiller`] | caps on moved range actions and operators (MILP) |

mod core;
mod loop_flow;
mod max_min_margin;
mod max_min_relative_margin;
mod mnec;
mod penalty;
mod ra_usage_limits;

pub use self::core::{CoreProblemFiller, RANGE_ACTION_SETPOINT_EPSILON};
pub use self::loop_flow::{MaxLoopFlowFiller, LOOP_FLOW_EPSILON};
pub use self::max_min_margin::MaxMinMarginFiller;
pub use self::max_min_relative_margin::MaxMinRelativeMarginFiller;
pub use self::mnec::MnecFiller;
pub use self::penalty::RangeActionPenaltyFiller;
pub use self::ra_usage_limits::{RaUsageLimitsFiller, RANGE_ACTION_USAGE_EPSILON};

pub(crate) use self::loop_flow::loop_flow_limit;
pub(crate) use self::mnec::mnec_bounds;

use rao_core::{Cnec, CnecId, OptimizationPerimeter, RaoResult, Side};

use crate::admissibility::AdmissibleRanges;
use crate::linear_problem::{LinearProblem, VariableId, VariableKey, VariableKind};
use crate::parameters::{LinearOptimizerParameters, ObjectiveKind};
use crate::sensitivity::LinearizationPoint;
use crate::setpoints::SetpointAssignment;

/// Read-only inputs of one fill or update pass.
#[derive(Clone, Copy)]
pub struct FillContext<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    pub ranges: &'a AdmissibleRanges,
    /// Linearization at the current working point.
    pub linearization: &'a LinearizationPoint,
    /// Linearization at the pre-optimisation point.
    pub initial_linearization: &'a LinearizationPoint,
    /// Setpoints the current linearization was computed at.
    pub setpoints: &'a SetpointAssignment,
    pub parameters: &'a LinearOptimizerParameters,
    /// Number of updates applied so far (0 on the first fill).
    pub iteration: u32,
}

/// Contributes to the linear problem (strategy pattern).
pub trait ProblemFiller: Send + Sync {
    fn name(&self) -> &'static str;

    /// First build of the filler's part of the problem.
    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()>;

    /// Refresh constants and coefficients from a new linearization.
    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()>;
}

/// Fillers for a parameter set, core filler first.
pub fn fillers_for(parameters: &LinearOptimizerParameters) -> Vec<Box<dyn ProblemFiller>> {
    let mut fillers: Vec<Box<dyn ProblemFiller>> = vec![Box::new(CoreProblemFiller)];
    match parameters.objective {
        ObjectiveKind::MaxMinMargin => fillers.push(Box::new(MaxMinMarginFiller)),
        ObjectiveKind::MaxMinRelativeMargin => {
            fillers.push(Box::new(MaxMinRelativeMarginFiller))
        }
    }
    fillers.push(Box::new(RangeActionPenaltyFiller));
    if parameters.has_usage_limits() {
        fillers.push(Box::new(RaUsageLimitsFiller));
    }
    if parameters.mnec.enabled {
        fillers.push(Box::new(MnecFiller));
    }
    if parameters.loop_flow.enabled {
        fillers.push(Box::new(MaxLoopFlowFiller));
    }
    fillers
}

/// Sides carrying a flow variable: the monitored sides, or side one for a
/// cnec without thresholds (loop-flow only).
pub(crate) fn flow_sides(cnec: &Cnec) -> Vec<Side> {
    let sides = cnec.monitored_sides();
    if sides.is_empty() {
        vec![Side::One]
    } else {
        sides
    }
}

pub(crate) fn flow_variable(problem: &mut LinearProblem, cnec: CnecId, side: Side) -> VariableId {
    problem.variable_or_insert(
        VariableKey::Flow { cnec, side },
        -LinearProblem::infinity(),
        LinearProblem::infinity(),
        VariableKind::Continuous,
    )
}

pub(crate) fn minimum_margin_variable(problem: &mut LinearProblem) -> VariableId {
    problem.variable_or_insert(
        VariableKey::MinimumMargin,
        -LinearProblem::infinity(),
        LinearProblem::infinity(),
        VariableKind::Continuous,
    )
}
