//! Monitored-only cnecs may lose at most an acceptable margin amount.
//!
//! Per bounded side: `F − V ≤ max(ub, F₀ + decrease) − adjustment` and
//! `F + V ≥ min(lb, F₀ − decrease) + adjustment`, `F₀` being the initial
//! flow. The violation `V` is costed in the objective.

use rao_core::{BoundDirection, CnecId, RaoResult, Side};

use super::{flow_variable, FillContext, ProblemFiller};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct MnecFiller;

impl ProblemFiller for MnecFiller {
    fn name(&self) -> &'static str {
        "mnec"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        set_mnec_constraints(problem, ctx);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        set_mnec_constraints(problem, ctx);
        Ok(())
    }
}

/// Widened (lower, upper) MW bounds of a monitored-only cnec side.
pub(crate) fn mnec_bounds(ctx: &FillContext<'_>, cnec_id: CnecId, side: Side) -> (Option<f64>, Option<f64>) {
    let cnec = ctx.perimeter.cnec(cnec_id);
    let (lower, upper) = cnec.bounds_mw(side);
    let decrease = ctx.parameters.mnec.acceptable_margin_decrease;
    match ctx.initial_linearization.flow(cnec_id, side) {
        Some(initial) => (
            lower.map(|lb| lb.min(initial - decrease)),
            upper.map(|ub| ub.max(initial + decrease)),
        ),
        None => (lower, upper),
    }
}

fn set_mnec_constraints(problem: &mut LinearProblem, ctx: &FillContext<'_>) {
    let inf = LinearProblem::infinity();
    let parameters = &ctx.parameters.mnec;
    for cnec_id in ctx.perimeter.monitored_cnecs() {
        let cnec = ctx.perimeter.cnec(cnec_id);
        let active = ctx.linearization.is_successful(cnec.state);
        for side in cnec.monitored_sides() {
            let (lower, upper) = mnec_bounds(ctx, cnec_id, side);
            let f = flow_variable(problem, cnec_id, side);
            let v = problem.variable_or_insert(
                VariableKey::MnecViolation { cnec: cnec_id, side },
                0.0,
                inf,
                VariableKind::Continuous,
            );
            problem.set_objective_coefficient(v, parameters.violation_cost);

            if let Some(ub) = upper {
                let c = problem.constraint_or_insert(
                    ConstraintKey::Mnec {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Upper,
                    },
                    -inf,
                    if active { ub - parameters.constraint_adjustment_coefficient } else { inf },
                );
                problem.set_coefficient(c, f, 1.0);
                problem.set_coefficient(c, v, -1.0);
            }
            if let Some(lb) = lower {
                let c = problem.constraint_or_insert(
                    ConstraintKey::Mnec {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Lower,
                    },
                    if active { lb + parameters.constraint_adjustment_coefficient } else { -inf },
                    inf,
                );
                problem.set_coefficient(c, f, 1.0);
                problem.set_coefficient(c, v, 1.0);
            }
        }
    }
}
