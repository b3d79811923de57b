//! Maximise the worst relative margin (margin / PTDF sum) once every cnec is
//! secure, the worst absolute margin otherwise.
//!
//! A binary `b` carries the sign of the worst absolute margin `M`:
//!
//! ```text
//! M ≤ 0                          M − BIG·b ≥ −BIG
//! 0 ≤ MR ≤ MRmax                 MR − MRmax·b ≤ 0
//! MR·k·p + F + BIG·b ≤ ub + BIG  MR·k·p − F + BIG·b ≤ −lb + BIG
//! ```
//!
//! With `b = 0` the relative variable is pinned to zero and its constraints
//! are slack; with `b = 1` the absolute margin is pinned to zero. The
//! objective is `−M − MR`. Needs a back end with integer support.

use rao_core::{BoundDirection, CnecId, RaoResult};

use super::max_min_margin::set_absolute_margin_constraints;
use super::{flow_sides, flow_variable, minimum_margin_variable, FillContext, ProblemFiller};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableId, VariableKey, VariableKind};

const MIN_BIG_M: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxMinRelativeMarginFiller;

struct Constants {
    /// MW
    big_flow: f64,
    /// Objective unit
    big_margin: f64,
    max_relative_margin: f64,
}

impl ProblemFiller for MaxMinRelativeMarginFiller {
    fn name(&self) -> &'static str {
        "max_min_relative_margin"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        let constants = constants(ctx);
        let inf = LinearProblem::infinity();

        let m = minimum_margin_variable(problem);
        problem.set_variable_bounds(m, -inf, 0.0);
        problem.set_objective_coefficient(m, -1.0);
        set_absolute_margin_constraints(problem, ctx, m);

        let mr = problem.variable_or_insert(
            VariableKey::MinimumRelativeMargin,
            0.0,
            constants.max_relative_margin,
            VariableKind::Continuous,
        );
        problem.set_objective_coefficient(mr, -1.0);
        let b = problem.variable_or_insert(VariableKey::MarginSign, 0.0, 1.0, VariableKind::Binary);

        let sign_absolute =
            problem.constraint_or_insert(ConstraintKey::MarginSignAbsolute, -constants.big_margin, inf);
        problem.set_coefficient(sign_absolute, m, 1.0);
        problem.set_coefficient(sign_absolute, b, -constants.big_margin);

        let sign_relative = problem.constraint_or_insert(ConstraintKey::MarginSignRelative, -inf, 0.0);
        problem.set_coefficient(sign_relative, mr, 1.0);
        problem.set_coefficient(sign_relative, b, -constants.max_relative_margin);

        set_relative_margin_constraints(problem, ctx, mr, b, constants.big_flow);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        let m = minimum_margin_variable(problem);
        set_absolute_margin_constraints(problem, ctx, m);
        if let (Some(mr), Some(b)) = (
            problem.variable(&VariableKey::MinimumRelativeMargin),
            problem.variable(&VariableKey::MarginSign),
        ) {
            let constants = constants(ctx);
            set_relative_margin_constraints(problem, ctx, mr, b, constants.big_flow);
        }
        Ok(())
    }
}

/// Big-M constants sized from the thresholds and initial flows.
fn constants(ctx: &FillContext<'_>) -> Constants {
    let unit = ctx.parameters.objective_unit;
    let mut largest: f64 = MIN_BIG_M;
    let mut unit_factor: f64 = 1.0;
    for cnec_id in ctx.perimeter.optimized_cnecs() {
        let cnec = ctx.perimeter.cnec(cnec_id);
        largest = largest.max(cnec.highest_threshold_mw());
        for side in flow_sides(cnec) {
            if let Some(flow) = ctx.initial_linearization.flow(cnec_id, side) {
                largest = largest.max(flow.abs());
            }
            unit_factor = unit_factor.max(cnec.unit_factor(side, unit));
        }
    }
    let big_flow = 2.0 * largest;
    let big_margin = big_flow * unit_factor;
    Constants {
        big_flow,
        big_margin,
        max_relative_margin: big_margin / ctx.parameters.relative_margin.ptdf_sum_lower_bound,
    }
}

fn relative_margin_coefficient(ctx: &FillContext<'_>, cnec: CnecId) -> f64 {
    let lower_bound = ctx.parameters.relative_margin.ptdf_sum_lower_bound;
    match ctx.linearization.ptdf_sum(cnec) {
        Some(ptdf) if !ptdf.is_nan() => ptdf.max(lower_bound),
        _ => lower_bound,
    }
}

fn set_relative_margin_constraints(
    problem: &mut LinearProblem,
    ctx: &FillContext<'_>,
    mr: VariableId,
    b: VariableId,
    big_flow: f64,
) {
    let inf = LinearProblem::infinity();
    let unit = ctx.parameters.objective_unit;
    for cnec_id in ctx.perimeter.optimized_cnecs() {
        let cnec = ctx.perimeter.cnec(cnec_id);
        let active = ctx.linearization.is_successful(cnec.state);
        let ptdf = relative_margin_coefficient(ctx, cnec_id);
        for side in flow_sides(cnec) {
            let (lower, upper) = cnec.bounds_mw(side);
            let coefficient = cnec.megawatts_per_unit(side, unit) * ptdf;
            let f = flow_variable(problem, cnec_id, side);

            if let Some(ub) = upper {
                let c = problem.constraint_or_insert(
                    ConstraintKey::MinimumRelativeMargin {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Upper,
                    },
                    -inf,
                    if active { ub + big_flow } else { inf },
                );
                problem.set_coefficient(c, mr, coefficient);
                problem.set_coefficient(c, f, 1.0);
                problem.set_coefficient(c, b, big_flow);
            }
            if let Some(lb) = lower {
                let c = problem.constraint_or_insert(
                    ConstraintKey::MinimumRelativeMargin {
                        cnec: cnec_id,
                        side,
                        direction: BoundDirection::Lower,
                    },
                    -inf,
                    if active { -lb + big_flow } else { inf },
                );
                problem.set_coefficient(c, mr, coefficient);
                problem.set_coefficient(c, f, -1.0);
                problem.set_coefficient(c, b, big_flow);
            }
        }
    }
}
