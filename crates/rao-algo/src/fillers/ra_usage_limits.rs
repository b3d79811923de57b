//! Caps on how many range actions, and how many operators, may move.
//!
//! A binary `used` is tied to each counted (range action, state) pair through
//! `AV − BIG·used ≤ ε`, `BIG` being the widest variation the admissible
//! ranges allow. Then, per limited state:
//!
//! - `Σ used ≤ max_ra`,
//! - `Σ operator_used ≤ max_tso`, with `operator_used ≥ used` for every
//!   counted action of a non-excluded operator,
//! - `Σ used ≤ max_ra_per_tso(operator)` over the operator's actions at the state.
//!
//! At a curative state the pairs of the earlier curative states of the same
//! contingency count too. A limit the counted pairs cannot exceed adds nothing.

use rao_core::{InstantKind, RaoResult, RangeActionId, StateId};
use std::collections::{BTreeMap, BTreeSet};

use super::{FillContext, ProblemFiller, RANGE_ACTION_SETPOINT_EPSILON};
use crate::admissibility::AdmissibleRange;
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableId, VariableKey, VariableKind};

/// Variation below which an action is not counted as used.
pub const RANGE_ACTION_USAGE_EPSILON: f64 = 1e-4;

type Counted<'a> = (RangeActionId, StateId, &'a AdmissibleRange);

#[derive(Debug, Clone, Copy, Default)]
pub struct RaUsageLimitsFiller;

impl ProblemFiller for RaUsageLimitsFiller {
    fn name(&self) -> &'static str {
        "ra_usage_limits"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let operators = operator_names(ctx);
        for &state in ctx.perimeter.states() {
            let instant = &ctx.perimeter.state(state).instant.id;
            let Some(limits) = ctx.parameters.usage_limits(instant) else {
                continue;
            };
            let counted = counted_actions(ctx, state);
            if let Some(max) = limits.max_ra {
                limit_used_count(problem, ctx, ConstraintKey::MaxRa { state }, &counted, max);
            }
            if let Some(max) = limits.max_tso {
                limit_operator_count(problem, ctx, state, &counted, &operators, max);
            }
            for (operator, &max) in &limits.max_ra_per_tso {
                let Ok(index) = operators.binary_search(operator) else {
                    continue;
                };
                let own: Vec<Counted<'_>> = counted
                    .iter()
                    .filter(|(ra, s, _)| {
                        *s == state && operator_of(ctx, *ra) == Some(operator.as_str())
                    })
                    .copied()
                    .collect();
                let key = ConstraintKey::MaxRaPerTso {
                    operator: index,
                    state,
                };
                limit_used_count(problem, ctx, key, &own, max);
            }
        }
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        _problem: &mut LinearProblem,
        _ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        Ok(())
    }
}

/// Sorted operator names; `VariableKey::OperatorUsed` indexes this list.
fn operator_names(ctx: &FillContext<'_>) -> Vec<String> {
    ctx.perimeter
        .range_action_ids()
        .filter_map(|ra| ctx.perimeter.range_action(ra).operator.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn operator_of<'a>(ctx: &FillContext<'a>, range_action: RangeActionId) -> Option<&'a str> {
    let perimeter = ctx.perimeter;
    perimeter.range_action(range_action).operator.as_deref()
}

/// Optimised pairs counted by the limits of `state`.
fn counted_actions<'a>(ctx: &FillContext<'a>, state: StateId) -> Vec<Counted<'a>> {
    let perimeter = ctx.perimeter;
    let ranges = ctx.ranges;
    let states = if perimeter.state(state).instant.kind == InstantKind::Curative {
        perimeter
            .chain(state)
            .into_iter()
            .filter(|&s| perimeter.state(s).instant.kind == InstantKind::Curative)
            .collect()
    } else {
        vec![state]
    };
    states
        .into_iter()
        .flat_map(move |s| {
            perimeter
                .range_actions_at(s)
                .iter()
                .filter_map(move |&ra| ranges.get(ra, s).map(|range| (ra, s, range)))
        })
        .collect()
}

fn limit_used_count(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    key: ConstraintKey,
    actions: &[Counted<'_>],
    max: u32,
) {
    if actions.len() <= max as usize {
        return;
    }
    let c = problem.constraint_or_insert(key, -LinearProblem::infinity(), f64::from(max));
    for &(range_action, state, range) in actions {
        let used = used_variable(problem, ctx, range_action, state, range);
        problem.set_coefficient(c, used, 1.0);
    }
}

fn limit_operator_count(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    limited: StateId,
    actions: &[Counted<'_>],
    operators: &[String],
    max: u32,
) {
    let inf = LinearProblem::infinity();
    let counted_states: BTreeSet<StateId> = actions.iter().map(|(_, s, _)| *s).collect();
    let excluded: BTreeSet<&str> = counted_states
        .iter()
        .filter_map(|&s| {
            ctx.parameters
                .ra_usage_limits
                .get(&ctx.perimeter.state(s).instant.id)
        })
        .flat_map(|limits| limits.max_tso_exclusion.iter().map(String::as_str))
        .collect();

    let mut per_operator: BTreeMap<usize, Vec<Counted<'_>>> = BTreeMap::new();
    for &(range_action, state, range) in actions {
        let Some(operator) = operator_of(ctx, range_action) else {
            continue;
        };
        if excluded.contains(operator) {
            continue;
        }
        if let Ok(index) = operators.binary_search_by(|o| o.as_str().cmp(operator)) {
            per_operator
                .entry(index)
                .or_default()
                .push((range_action, state, range));
        }
    }
    if per_operator.len() <= max as usize {
        return;
    }

    let total = problem.constraint_or_insert(ConstraintKey::MaxTso { state: limited }, -inf, f64::from(max));
    for (operator, own) in per_operator {
        let operator_used = problem.variable_or_insert(
            VariableKey::OperatorUsed {
                operator,
                state: limited,
            },
            0.0,
            1.0,
            VariableKind::Binary,
        );
        problem.set_coefficient(total, operator_used, 1.0);
        for (range_action, state, range) in own {
            let used = used_variable(problem, ctx, range_action, state, range);
            let c = problem.constraint_or_insert(
                ConstraintKey::OperatorUsed {
                    operator,
                    range_action,
                    state,
                    limited,
                },
                0.0,
                inf,
            );
            problem.set_coefficient(c, operator_used, 1.0);
            problem.set_coefficient(c, used, -1.0);
        }
    }
}

/// Binary `used` of a pair, tied to its absolute variation on first use.
fn used_variable(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    range_action: RangeActionId,
    state: StateId,
    range: &AdmissibleRange,
) -> VariableId {
    let inf = LinearProblem::infinity();
    let used = problem.variable_or_insert(
        VariableKey::RangeActionUsed { range_action, state },
        0.0,
        1.0,
        VariableKind::Binary,
    );
    let av = problem.variable_or_insert(
        VariableKey::AbsoluteVariation { range_action, state },
        0.0,
        inf,
        VariableKind::Continuous,
    );
    let c = problem.constraint_or_insert(
        ConstraintKey::RangeActionUsed { range_action, state },
        -inf,
        RANGE_ACTION_USAGE_EPSILON,
    );
    problem.set_coefficient(c, av, 1.0);
    problem.set_coefficient(c, used, -variation_bound(ctx, range_action, range));
    used
}

/// Widest `|S − S_prev|` the admissible ranges allow.
fn variation_bound(ctx: &FillContext<'_>, range_action: RangeActionId, range: &AdmissibleRange) -> f64 {
    let reach = match range.previous.and_then(|p| ctx.ranges.get(range_action, p)) {
        Some(previous) => (range.max - previous.min).max(previous.max - range.min),
        None => {
            let initial = ctx.perimeter.range_action(range_action).initial_setpoint;
            (range.max - initial).max(initial - range.min)
        }
    };
    reach.max(0.0) + 2.0 * RANGE_ACTION_SETPOINT_EPSILON
}
