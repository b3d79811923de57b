//! Loop-flow limits on cnecs carrying a loop-flow threshold.
//!
//! `LFmax = max(threshold, |initial loop flow| + acceptable increase) − adjustment`,
//! then per side `commercial − LFmax − ε ≤ F ± V ≤ commercial + LFmax + ε` with
//! the violation `V` costed in the objective (shared between sides).

use rao_core::{BoundDirection, CnecId, RaoResult, Side};

use super::{flow_sides, flow_variable, FillContext, ProblemFiller};
use crate::linear_problem::{ConstraintKey, LinearProblem, VariableKey, VariableKind};

/// Slack added to loop-flow bounds, MW.
pub const LOOP_FLOW_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxLoopFlowFiller;

impl ProblemFiller for MaxLoopFlowFiller {
    fn name(&self) -> &'static str {
        "max_loop_flow"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        set_loop_flow_constraints(problem, ctx);
        Ok(())
    }

    fn update_between_sensi_iteration(
        &self,
        problem: &mut LinearProblem,
        ctx: &FillContext<'_>,
    ) -> RaoResult<()> {
        // commercial flows only move when they are recomputed
        set_loop_flow_constraints(problem, ctx);
        Ok(())
    }
}

/// Maximum loop flow allowed on `cnec`, before the LP adjustment.
pub(crate) fn loop_flow_limit(ctx: &FillContext<'_>, cnec: CnecId, side: Side, threshold: f64) -> f64 {
    let initial = ctx
        .initial_linearization
        .loop_flow(cnec, side)
        .map_or(0.0, f64::abs);
    threshold.max(initial + ctx.parameters.loop_flow.acceptable_increase)
}

fn set_loop_flow_constraints(problem: &mut LinearProblem, ctx: &FillContext<'_>) {
    let inf = LinearProblem::infinity();
    let parameters = &ctx.parameters.loop_flow;
    for cnec_id in ctx.perimeter.loop_flow_cnecs() {
        let cnec = ctx.perimeter.cnec(cnec_id);
        let Some(threshold) = cnec.loop_flow_threshold_mw else {
            continue;
        };
        let active = ctx.linearization.is_successful(cnec.state);
        let sides = flow_sides(cnec);
        let cost = parameters.violation_cost / sides.len() as f64;

        for side in sides {
            let f = flow_variable(problem, cnec_id, side);
            let v = problem.variable_or_insert(
                VariableKey::LoopFlowViolation { cnec: cnec_id, side },
                0.0,
                inf,
                VariableKind::Continuous,
            );
            problem.set_objective_coefficient(v, cost);

            let limit = loop_flow_limit(ctx, cnec_id, side, threshold)
                - parameters.constraint_adjustment_coefficient;
            let commercial = ctx.linearization.commercial_flow(cnec_id, side);

            // F − V ≤ commercial + LFmax + ε
            let upper = problem.constraint_or_insert(
                ConstraintKey::LoopFlow {
                    cnec: cnec_id,
                    side,
                    direction: BoundDirection::Upper,
                },
                -inf,
                if active { commercial + limit + LOOP_FLOW_EPSILON } else { inf },
            );
            problem.set_coefficient(upper, f, 1.0);
            problem.set_coefficient(upper, v, -1.0);

            // F + V ≥ commercial − LFmax − ε
            let lower = problem.constraint_or_insert(
                ConstraintKey::LoopFlow {
                    cnec: cnec_id,
                    side,
                    direction: BoundDirection::Lower,
                },
                if active { commercial - limit - LOOP_FLOW_EPSILON } else { -inf },
                inf,
            );
            problem.set_coefficient(lower, f, 1.0);
            problem.set_coefficient(lower, v, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admissibility::AdmissibilityResolver;
    use crate::fillers::CoreProblemFiller;
    use crate::linear_problem::GoodLpBackend;
    use crate::parameters::LinearOptimizerParameters;
    use crate::sensitivity::LinearizationPoint;
    use crate::setpoints::SetpointAssignment;
    use rao_core::{Cnec, Instant, PerimeterBuilder, RangeAction, Threshold};

    #[test]
    fn test_limit_and_violation() {
        let mut builder = PerimeterBuilder::new();
        let state = builder.add_state(Instant::preventive(), None);
        let cnec = builder.add_cnec(
            Cnec::new("interconnector", state)
                .with_threshold(Threshold::megawatt(Side::One, None, Some(1000.0)))
                .optimized(false)
                .with_loop_flow_threshold(50.0),
        );
        let ra = builder.add_range_action(RangeAction::hvdc("hvdc", -10.0, 10.0, 0.0));
        builder.make_available(ra, state);
        let perimeter = builder.build().unwrap();
        let ranges = AdmissibilityResolver::new(&perimeter).resolve_all();

        // loop flow 100 − 20 = 80, above the threshold
        let mut linearization = LinearizationPoint::new();
        linearization.set_flow(cnec, Side::One, 100.0);
        linearization.set_commercial_flow(cnec, Side::One, 20.0);
        linearization.set_sensitivity(cnec, Side::One, ra, 1.0);
        let setpoints = SetpointAssignment::new(&perimeter);
        let mut parameters = LinearOptimizerParameters::default();
        parameters.loop_flow.acceptable_increase = 5.0;
        let ctx = FillContext {
            perimeter: &perimeter,
            ranges: &ranges,
            linearization: &linearization,
            initial_linearization: &linearization,
            setpoints: &setpoints,
            parameters: &parameters,
            iteration: 0,
        };
        assert_eq!(loop_flow_limit(&ctx, cnec, Side::One, 50.0), 85.0);

        let mut problem = LinearProblem::new();
        CoreProblemFiller.fill(&mut problem, &ctx).unwrap();
        MaxLoopFlowFiller.fill(&mut problem, &ctx).unwrap();
        let upper = problem
            .constraint(&ConstraintKey::LoopFlow {
                cnec,
                side: Side::One,
                direction: BoundDirection::Upper,
            })
            .unwrap();
        assert!((problem.constraint_bounds(upper).1 - (20.0 + 85.0 + LOOP_FLOW_EPSILON)).abs() < 1e-9);

        problem.solve(&GoodLpBackend::default(), None).unwrap();
        let v = problem
            .variable(&VariableKey::LoopFlowViolation {
                cnec,
                side: Side::One,
            })
            .unwrap();
        assert!(problem.value(v).unwrap() < 1e-4);
    }
}
