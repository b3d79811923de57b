use rao_core::RaoResult;

use super::{FillContext, ProblemFiller};
use crate::linear_problem::{LinearProblem, VariableKey, VariableKind};

/// Adds `penalty_cost(kind)·AV` for every optimised (range action, state).
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeActionPenaltyFiller;

impl ProblemFiller for RangeActionPenaltyFiller {
    fn name(&self) -> &'static str {
        "range_action_penalty"
    }

    fn fill(&self, problem: &mut LinearProblem, ctx: &FillContext<'_>) -> RaoResult<()> {
        for (range_action, state, _) in ctx.ranges.iter() {
            let kind = ctx.perimeter.range_action(range_action).action_type();
            let av = problem.variable_or_insert(
                VariableKey::AbsoluteVariation { range_action, state },
                0.0,
                LinearProblem::infinity(),
                VariableKind::Continuous,
            );
            problem.set_objective_coefficient(av, ctx.parameters.range_action(kind).penalty_cost);
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
