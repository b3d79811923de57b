//! True-flow evaluation of a setpoint assignment.
//!
//! The controller never trusts the linear problem's objective: each candidate
//! is re-evaluated on the flows returned by the sensitivity engine, with the
//! same terms the fillers put in the problem.
//!
//! `cost = functional + penalty + virtual`, lower is better:
//!
//! - functional: minus the worst margin (or worst relative margin once every
//!   margin is non-negative),
//! - penalty: `penalty_cost·|s − s_prev|` over optimised pairs,
//! - virtual: loop-flow and MNEC excesses times their violation costs.
//!
//! Cnecs of failed states are ignored.

use rao_core::OptimizationPerimeter;
use serde::{Deserialize, Serialize};

use crate::admissibility::AdmissibleRanges;
use crate::fillers::{flow_sides, loop_flow_limit, mnec_bounds, FillContext};
use crate::parameters::{LinearOptimizerParameters, ObjectiveKind};
use crate::sensitivity::LinearizationPoint;
use crate::setpoints::SetpointAssignment;

/// Evaluated objective of one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveValue {
    /// Worst margin over optimised cnecs, objective unit
    pub worst_margin: Option<f64>,
    /// Worst PTDF-normalised margin, relative objective only
    pub worst_relative_margin: Option<f64>,
    pub functional_cost: f64,
    pub penalty_cost: f64,
    pub virtual_cost: f64,
}

impl ObjectiveValue {
    pub fn cost(&self) -> f64 {
        self.functional_cost + self.penalty_cost + self.virtual_cost
    }
}

pub struct ObjectiveFunction<'a> {
    perimeter: &'a OptimizationPerimeter,
    ranges: &'a AdmissibleRanges,
    parameters: &'a LinearOptimizerParameters,
    initial_linearization: &'a LinearizationPoint,
}

impl<'a> ObjectiveFunction<'a> {
    pub fn new(
        perimeter: &'a OptimizationPerimeter,
        ranges: &'a AdmissibleRanges,
        parameters: &'a LinearOptimizerParameters,
        initial_linearization: &'a LinearizationPoint,
    ) -> Self {
        Self {
            perimeter,
            ranges,
            parameters,
            initial_linearization,
        }
    }

    pub fn evaluate(
        &self,
        linearization: &LinearizationPoint,
        setpoints: &SetpointAssignment,
    ) -> ObjectiveValue {
        let (worst_margin, worst_relative_margin) = self.worst_margins(linearization);
        let functional_cost = match (self.parameters.objective, worst_margin, worst_relative_margin) {
            (_, None, _) => 0.0,
            (ObjectiveKind::MaxMinRelativeMargin, Some(m), Some(relative)) if m >= 0.0 => -relative,
            (_, Some(m), _) => -m,
        };
        let ctx = FillContext {
            perimeter: self.perimeter,
            ranges: self.ranges,
            linearization,
            initial_linearization: self.initial_linearization,
            setpoints,
            parameters: self.parameters,
            iteration: 0,
        };
        ObjectiveValue {
            worst_margin,
            worst_relative_margin,
            functional_cost,
            penalty_cost: self.penalty_cost(setpoints),
            virtual_cost: self.loop_flow_cost(&ctx) + self.mnec_cost(&ctx),
        }
    }

    fn worst_margins(&self, linearization: &LinearizationPoint) -> (Option<f64>, Option<f64>) {
        let unit = self.parameters.objective_unit;
        let relative = self.parameters.objective == ObjectiveKind::MaxMinRelativeMargin;
        let ptdf_floor = self.parameters.relative_margin.ptdf_sum_lower_bound;
        let mut worst: Option<f64> = None;
        let mut worst_relative: Option<f64> = None;

        for cnec_id in self.perimeter.optimized_cnecs() {
            let cnec = self.perimeter.cnec(cnec_id);
            if !linearization.is_successful(cnec.state) {
                continue;
            }
            for side in cnec.monitored_sides() {
                let Some(flow) = linearization.flow(cnec_id, side) else {
                    continue;
                };
                let Some(margin_mw) = cnec.margin_mw(side, flow) else {
                    continue;
                };
                let margin = margin_mw * cnec.unit_factor(side, unit);
                worst = Some(worst.map_or(margin, |w| w.min(margin)));
                if relative {
                    let ptdf = match linearization.ptdf_sum(cnec_id) {
                        Some(p) if !p.is_nan() => p.max(ptdf_floor),
                        _ => ptdf_floor,
                    };
                    let relative_margin = if margin >= 0.0 { margin / ptdf } else { margin };
                    worst_relative =
                        Some(worst_relative.map_or(relative_margin, |w| w.min(relative_margin)));
                }
            }
        }
        (worst, worst_relative)
    }

    fn penalty_cost(&self, setpoints: &SetpointAssignment) -> f64 {
        self.ranges
            .iter()
            .map(|(ra, state, _)| {
                let kind = self.perimeter.range_action(ra).action_type();
                let variation =
                    (setpoints.setpoint(ra, state) - setpoints.previous_setpoint(ra, state)).abs();
                self.parameters.range_action(kind).penalty_cost * variation
            })
            .sum()
    }

    fn loop_flow_cost(&self, ctx: &FillContext<'_>) -> f64 {
        if !self.parameters.loop_flow.enabled {
            return 0.0;
        }
        let mut cost = 0.0;
        for cnec_id in self.perimeter.loop_flow_cnecs() {
            let cnec = self.perimeter.cnec(cnec_id);
            let Some(threshold) = cnec.loop_flow_threshold_mw else {
                continue;
            };
            if !ctx.linearization.is_successful(cnec.state) {
                continue;
            }
            let sides = flow_sides(cnec);
            let side_cost = self.parameters.loop_flow.violation_cost / sides.len() as f64;
            for side in sides {
                let Some(loop_flow) = ctx.linearization.loop_flow(cnec_id, side) else {
                    continue;
                };
                let limit = loop_flow_limit(ctx, cnec_id, side, threshold);
                cost += side_cost * (loop_flow.abs() - limit).max(0.0);
            }
        }
        cost
    }

    fn mnec_cost(&self, ctx: &FillContext<'_>) -> f64 {
        if !self.parameters.mnec.enabled {
            return 0.0;
        }
        let mut cost = 0.0;
        for cnec_id in self.perimeter.monitored_cnecs() {
            let cnec = self.perimeter.cnec(cnec_id);
            if !ctx.linearization.is_successful(cnec.state) {
                continue;
            }
            for side in cnec.monitored_sides() {
                let Some(flow) = ctx.linearization.flow(cnec_id, side) else {
                    continue;
                };
                let (lower, upper) = mnec_bounds(ctx, cnec_id, side);
                let excess = upper
                    .map_or(0.0, |ub| flow - ub)
                    .max(lower.map_or(0.0, |lb| lb - flow))
                    .max(0.0);
                cost += self.parameters.mnec.violation_cost * excess;
            }
        }
        cost
    }
}
