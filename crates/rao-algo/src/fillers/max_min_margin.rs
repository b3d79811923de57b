//! Maximise the worst absolute margin over optimised cnecs.
//!
//! `M·k + F ≤ ub` and `M·k − F ≤ −lb` per bounded side, where `k` is the MW
//! value of one objective unit on that side. Objective: `−M`.

use rao_core::{BoundDirection, RaoResult};

use super::{flow_sides, flow_variable, minimum_margin_variable, FillContext, ProblemFiller};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableId};

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMinMarginFiller;

impl ProblemFiller for MaxMinMarginFiller {
    fn name(&self) -> &'static str {
        "max_min_margin"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let m = minimum_margin_variable(problem);
        problem.set_objective_coefficient(m, -1.0);
        set_absolute_margin_constraints(problem, ctx, m);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        let m = minimum_margin_variable(problem);
        set_absolute_margin_constraints(problem, ctx, m);
        Ok(())
    }
}

/// Writes the absolute margin constraints; those of failed states are relaxed.
pub(crate) fn set_absolute_margin_constraints(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    m: VariableId,
) {
    let inf = LinearProblem::infinity();
    let unit = ctx.parameters.objective_unit;
    for cnec_id in ctx.perimeter.optimized_cnecs() {
        let cnec = ctx.perimeter.cnec(cnec_id);
        let active = ctx.linearization.is_successful(cnec.state);
        for side in flow_sides(cnec) {
            let (lower, upper) = cnec.bounds_mw(side);
            let k = cnec.megawatts_per_unit(side, unit);
            let f = flow_variable(problem, cnec_id, side);

            if let Some(ub) = upper {
                let c = problem.constraint_or_insert(
                    ConstraintKey::MinimumMargin {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Upper,
                    },
                    -inf,
                    if active { ub } else { inf },
                );
                problem.set_coefficient(c, m, k);
                problem.set_coefficient(c, f, 1.0);
            }
            if let Some(lb) = lower {
                let c = problem.constraint_or_insert(
                    ConstraintKey::MinimumMargin {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Lower,
                    },
                    -inf,
                    if active { -lb } else { inf },
                );
                problem.set_coefficient(c, m, k);
                problem.set_coefficient(c, f, -1.0);
            }
        }
    }
}
