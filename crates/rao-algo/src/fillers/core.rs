//! Core filler: setpoint variables and the linearized flow model.
//!
//! For every optimised (range action, state) pair:
//!
//! - `S` bounded by the admissible range, widened by [`RANGE_ACTION_SETPOINT_EPSILON`],
//! - `AV ≥ |S − S_prev|` through two constraints, `S_prev` being the setpoint
//!   at the previous optimised state or the pre-optimisation value,
//! - `S − S_prev` within the relative-to-previous bounds when they exist.
//!
//! For every cnec side, `F − Σ sens·S = ref − Σ sens·s₀`, summing over the
//! range actions acting on the cnec at the latest optimised state of its chain.

use rao_core::{CnecId, RaoError, RaoResult, RangeActionId, RangeActionType, Side, StateId};
use std::collections::BTreeMap;

use super::{flow_sides, flow_variable, FillContext, ProblemFiller};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableId, VariableKey, VariableKind};

/// Slack added around admissible ranges so rounding noise never makes the
/// current setpoint infeasible.
pub const RANGE_ACTION_SETPOINT_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, Default)]
pub struct CoreProblemFiller;

impl ProblemFiller for CoreProblemFiller {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        build_setpoint_variables(problem, ctx);
        build_range_action_constraints(problem, ctx)?;
        build_injection_balance(problem, ctx)?;
        for cnec in ctx.perimeter.cnec_ids() {
            for side in flow_sides(ctx.perimeter.cnec(cnec)) {
                set_flow_constraint(problem, ctx, cnec, side)?;
            }
        }
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        for cnec in ctx.perimeter.cnec_ids() {
            for side in flow_sides(ctx.perimeter.cnec(cnec)) {
                set_flow_constraint(problem, ctx, cnec, side)?;
            }
        }
        if ctx.parameters.ra_range_shrinking && ctx.iteration > 0 {
            shrink_ranges(problem, ctx)?;
        }
        Ok(())
    }
}

fn build_setpoint_variables(problem: &mut LinearProblem, ctx: &FillContext<'_>) {
    for (range_action, state, range) in ctx.ranges.iter() {
        let s = problem.variable_or_insert(
            VariableKey::Setpoint { range_action, state },
            range.min - RANGE_ACTION_SETPOINT_EPSILON,
            range.max + RANGE_ACTION_SETPOINT_EPSILON,
            VariableKind::Continuous,
        );
        problem.set_variable_bounds(
            s,
            range.min - RANGE_ACTION_SETPOINT_EPSILON,
            range.max + RANGE_ACTION_SETPOINT_EPSILON,
        );
        problem.variable_or_insert(
            VariableKey::AbsoluteVariation { range_action, state },
            0.0,
            LinearProblem::infinity(),
            VariableKind::Continuous,
        );
    }
}

fn build_range_action_constraints(problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
    let inf = LinearProblem::infinity();
    for (range_action, state, range) in ctx.ranges.iter() {
        let s = setpoint_variable(problem, range_action, state)?;
        let av = problem
            .variable(&VariableKey::AbsoluteVariation { range_action, state })
            .ok_or_else(|| missing_variable("absolute variation", range_action.value(), state))?;

        // AV − S + S_prev ≥ 0 and AV + S − S_prev ≥ 0
        let positive = problem.constraint_or_insert(
            ConstraintKey::AbsoluteVariationPositive { range_action, state },
            0.0,
            inf,
        );
        let negative = problem.constraint_or_insert(
            ConstraintKey::AbsoluteVariationNegative { range_action, state },
            0.0,
            inf,
        );
        problem.set_coefficient(positive, av, 1.0);
        problem.set_coefficient(positive, s, -1.0);
        problem.set_coefficient(negative, av, 1.0);
        problem.set_coefficient(negative, s, 1.0);

        match range.previous {
            Some(previous) => {
                let s_prev = setpoint_variable(problem, range_action, previous)?;
                problem.set_coefficient(positive, s_prev, 1.0);
                problem.set_coefficient(negative, s_prev, -1.0);
                if let Some((lo, hi)) = range.relative {
                    let relative = problem.constraint_or_insert(
                        ConstraintKey::RelativeSetpoint { range_action, state },
                        lo - RANGE_ACTION_SETPOINT_EPSILON,
                        hi + RANGE_ACTION_SETPOINT_EPSILON,
                    );
                    problem.set_coefficient(relative, s, 1.0);
                    problem.set_coefficient(relative, s_prev, -1.0);
                }
            }
            None => {
                let initial = ctx.perimeter.range_action(range_action).initial_setpoint;
                problem.set_constraint_bounds(positive, -initial, inf);
                problem.set_constraint_bounds(negative, initial, inf);
            }
        }
    }
    Ok(())
}

/// Σ key·(S − S_prev) = 0 over the injection actions optimised at a state.
fn build_injection_balance(problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
    let mut constants: BTreeMap<StateId, f64> = BTreeMap::new();
    let mut terms: BTreeMap<StateId, Vec<(VariableKey, f64)>> = BTreeMap::new();

    for (range_action, state, range) in ctx.ranges.iter() {
        let action = ctx.perimeter.range_action(range_action);
        if action.action_type() != RangeActionType::Injection {
            continue;
        }
        let key = action.total_distribution_key();
        let entry = terms.entry(state).or_default();
        entry.push((VariableKey::Setpoint { range_action, state }, key));
        match range.previous {
            Some(previous) => entry.push((
                VariableKey::Setpoint {
                    range_action,
                    state: previous,
                },
                -key,
            )),
            None => *constants.entry(state).or_default() += key * action.initial_setpoint,
        }
    }

    for (state, terms) in terms {
        let constant = constants.get(&state).copied().unwrap_or(0.0);
        let balance =
            problem.constraint_or_insert(ConstraintKey::InjectionBalance { state }, constant, constant);
        problem.clear_coefficients(balance);
        for (key, coefficient) in terms {
            let variable = problem
                .variable(&key)
                .ok_or_else(|| RaoError::Structural(format!("no variable {key} for injection balance")))?;
            problem.set_coefficient(balance, variable, coefficient);
        }
    }
    Ok(())
}

/// Range actions acting on `cnec`, each at the latest state of the cnec's
/// chain where it is optimised.
fn acting_setpoints(ctx: &FillContext<'_>, cnec: CnecId) -> Vec<(RangeActionId, StateId)> {
    ctx.perimeter
        .range_actions_acting_on(cnec, |range_action, state| ctx.ranges.contains(range_action, state))
}

fn set_flow_constraint(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    cnec: CnecId,
    side: Side,
) -> RaoResult<()> {
    let f = flow_variable(problem, cnec, side);
    let state = ctx.perimeter.cnec(cnec).state;
    let constraint = problem.constraint_or_insert(ConstraintKey::Flow { cnec, side }, 0.0, 0.0);
    problem.clear_coefficients(constraint);
    problem.set_coefficient(constraint, f, 1.0);

    if !ctx.linearization.is_successful(state) {
        // flow left free, its margin constraints are relaxed as well
        let inf = LinearProblem::infinity();
        problem.set_constraint_bounds(constraint, -inf, inf);
        return Ok(());
    }

    let cnec_name = &ctx.perimeter.cnec(cnec).name;
    let mut constant = ctx.linearization.flow(cnec, side).ok_or_else(|| {
        RaoError::Sensitivity(format!("no reference flow for cnec {cnec_name} on side {side}"))
    })?;

    for (range_action, at_state) in acting_setpoints(ctx, cnec) {
        let action = ctx.perimeter.range_action(range_action);
        let sensitivity = ctx
            .linearization
            .sensitivity(cnec, side, range_action)
            .ok_or_else(|| {
                RaoError::Sensitivity(format!(
                    "no sensitivity of cnec {cnec_name} on side {side} to {}",
                    action.name
                ))
            })?;
        let threshold = ctx
            .parameters
            .range_action(action.action_type())
            .sensitivity_threshold;
        if sensitivity.abs() < threshold || sensitivity == 0.0 {
            continue;
        }
        let s = setpoint_variable(problem, range_action, at_state)?;
        constant -= sensitivity * ctx.setpoints.setpoint(range_action, at_state);
        problem.set_coefficient(constraint, s, -sensitivity);
    }
    problem.set_constraint_bounds(constraint, constant, constant);
    Ok(())
}

/// Bounds every setpoint to `s₀ ± width·rate^iteration`.
fn shrink_ranges(problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
    let factor = ctx
        .parameters
        .range_shrink_rate
        .powi(i32::try_from(ctx.iteration).unwrap_or(i32::MAX));
    for (range_action, state, range) in ctx.ranges.iter() {
        let s = setpoint_variable(problem, range_action, state)?;
        let center = ctx.setpoints.setpoint(range_action, state);
        let half_width = range.width() * factor;
        let constraint = problem.constraint_or_insert(
            ConstraintKey::RangeShrink { range_action, state },
            center - half_width - RANGE_ACTION_SETPOINT_EPSILON,
            center + half_width + RANGE_ACTION_SETPOINT_EPSILON,
        );
        problem.set_coefficient(constraint, s, 1.0);
    }
    Ok(())
}

fn setpoint_variable(
    problem: &LinearProblem,
    range_action: RangeActionId,
    state: StateId,
) -> RaoResult<VariableId> {
    problem
        .variable(&VariableKey::Setpoint { range_action, state })
        .ok_or_else(|| missing_variable("setpoint", range_action.value(), state))
}

fn missing_variable(what: &str, range_action: usize, state: StateId) -> RaoError {
    RaoError::Structural(format!(
        "no {what} variable for range action {range_action} at state {}",
        state.value()
    ))
}
