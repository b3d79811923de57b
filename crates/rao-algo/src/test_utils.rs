//! Synthetic sensitivity engine for tests and examples.
//!
//! Flows are `ref + Σ sens·Δ + curvature·Δ²` where `Δ` is the setpoint of a
//! range action at the cnec's state minus its pre-optimisation value. With
//! no curvature the engine is exactly linear; curvature makes linearizations
//! overshoot so iterations can come out worse.

use rao_core::{CnecId, OptimizationPerimeter, RaoError, RaoResult, RangeActionId, Side, StateId};
use std::collections::{BTreeSet, HashMap};

use crate::sensitivity::{ComputationStatus, LinearizationPoint, SensitivityEngine};
use crate::setpoints::SetpointAssignment;

#[derive(Debug, Clone, Default)]
pub struct SyntheticEngine {
    reference_flows: HashMap<(CnecId, Side), f64>,
    sensitivities: HashMap<(CnecId, Side, RangeActionId), f64>,
    curvatures: HashMap<(CnecId, Side, RangeActionId), f64>,
    ptdf_sums: HashMap<CnecId, f64>,
    commercial_flows: HashMap<(CnecId, Side), f64>,
    failing_states: BTreeSet<StateId>,
    fail_on_call: Option<usize>,
    calls: usize,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flow at the pre-optimisation setpoints.
    pub fn with_flow(mut self, cnec: CnecId, side: Side, flow_mw: f64) -> Self {
        self.reference_flows.insert((cnec, side), flow_mw);
        self
    }

    pub fn with_sensitivity(mut self, cnec: CnecId, side: Side, range_action: RangeActionId, value: f64) -> Self {
        self.sensitivities.insert((cnec, side, range_action), value);
        self
    }

    pub fn with_curvature(mut self, cnec: CnecId, side: Side, range_action: RangeActionId, value: f64) -> Self {
        self.curvatures.insert((cnec, side, range_action), value);
        self
    }

    pub fn with_ptdf_sum(mut self, cnec: CnecId, value: f64) -> Self {
        self.ptdf_sums.insert(cnec, value);
        self
    }

    pub fn with_commercial_flow(mut self, cnec: CnecId, side: Side, flow_mw: f64) -> Self {
        self.commercial_flows.insert((cnec, side), flow_mw);
        self
    }

    /// Report a failed load flow for `state` on every call.
    pub fn failing_state(mut self, state: StateId) -> Self {
        self.failing_states.insert(state);
        self
    }

    /// Return an error on the `call`-th computation (1-based).
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl SensitivityEngine for SyntheticEngine {
    fn compute(
        &mut self,
        perimeter: &OptimizationPerimeter,
        setpoints: &SetpointAssignment,
    ) -> RaoResult<LinearizationPoint> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(RaoError::Sensitivity(format!(
                "synthetic failure on call {}",
                self.calls
            )));
        }

        let mut point = LinearizationPoint::new();
        for &state in perimeter.states() {
            if self.failing_states.contains(&state) {
                point.set_state_status(state, ComputationStatus::Failure);
            }
        }
        for (&(cnec, side), &reference) in &self.reference_flows {
            let state = perimeter.cnec(cnec).state;
            if self.failing_states.contains(&state) {
                continue;
            }
            let mut flow = reference;
            for range_action in perimeter.range_action_ids() {
                let delta = setpoints.setpoint(range_action, state) - setpoints.initial(range_action);
                let sensitivity = self
                    .sensitivities
                    .get(&(cnec, side, range_action))
                    .copied()
                    .unwrap_or(0.0);
                let curvature = self
                    .curvatures
                    .get(&(cnec, side, range_action))
                    .copied()
                    .unwrap_or(0.0);
                flow += sensitivity * delta + curvature * delta * delta;
                // local derivative at the current point
                point.set_sensitivity(cnec, side, range_action, sensitivity + 2.0 * curvature * delta);
            }
            point.set_flow(cnec, side, flow);
            if let Some(commercial) = self.commercial_flows.get(&(cnec, side)) {
                point.set_commercial_flow(cnec, side, *commercial);
            }
        }
        for (&cnec, &ptdf) in &self.ptdf_sums {
            point.set_ptdf_sum(cnec, ptdf);
        }
        Ok(point)
    }
}
