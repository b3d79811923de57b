//! Contract with the external load-flow / sensitivity engine.
//!
//! The engine is a blocking collaborator: given the perimeter and a setpoint
//! assignment it returns a fresh [`LinearizationPoint`]. A linearization is
//! only valid for the assignment it was computed at; the controller consumes
//! one per iteration and never reuses it afterwards.

use rao_core::{CnecId, OptimizationPerimeter, RaoResult, RangeActionId, Side, StateId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::setpoints::SetpointAssignment;

/// Outcome of the load-flow computation of one state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStatus {
    #[default]
    Success,
    Failure,
}

/// Reference flows and partial derivatives at one working point (MW).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearizationPoint {
    flows: HashMap<(CnecId, Side), f64>,
    sensitivities: HashMap<(CnecId, Side, RangeActionId), f64>,
    ptdf_sums: HashMap<CnecId, f64>,
    commercial_flows: HashMap<(CnecId, Side), f64>,
    state_status: HashMap<StateId, ComputationStatus>,
}

impl LinearizationPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flow(&mut self, cnec: CnecId, side: Side, flow_mw: f64) {
        self.flows.insert((cnec, side), flow_mw);
    }

    /// dF(cnec, side) / dS(range action), MW per optimisation unit.
    pub fn set_sensitivity(&mut self, cnec: CnecId, side: Side, range_action: RangeActionId, value: f64) {
        self.sensitivities.insert((cnec, side, range_action), value);
    }

    /// Zone-to-zone PTDF absolute sum, used by relative margins.
    pub fn set_ptdf_sum(&mut self, cnec: CnecId, value: f64) {
        self.ptdf_sums.insert(cnec, value);
    }

    pub fn set_commercial_flow(&mut self, cnec: CnecId, side: Side, flow_mw: f64) {
        self.commercial_flows.insert((cnec, side), flow_mw);
    }

    pub fn set_state_status(&mut self, state: StateId, status: ComputationStatus) {
        self.state_status.insert(state, status);
    }

    pub fn flow(&self, cnec: CnecId, side: Side) -> Option<f64> {
        self.flows.get(&(cnec, side)).copied()
    }

    pub fn sensitivity(&self, cnec: CnecId, side: Side, range_action: RangeActionId) -> Option<f64> {
        self.sensitivities.get(&(cnec, side, range_action)).copied()
    }

    pub fn ptdf_sum(&self, cnec: CnecId) -> Option<f64> {
        self.ptdf_sums.get(&cnec).copied()
    }

    /// Commercial flow, 0 when the engine does not report one.
    pub fn commercial_flow(&self, cnec: CnecId, side: Side) -> f64 {
        self.commercial_flows
            .get(&(cnec, side))
            .copied()
            .unwrap_or(0.0)
    }

    /// Loop flow = flow − commercial flow.
    pub fn loop_flow(&self, cnec: CnecId, side: Side) -> Option<f64> {
        self.flow(cnec, side)
            .map(|flow| flow - self.commercial_flow(cnec, side))
    }

    /// Status of `state`; states the engine did not mention are successful.
    pub fn state_status(&self, state: StateId) -> ComputationStatus {
        self.state_status.get(&state).copied().unwrap_or_default()
    }

    pub fn is_successful(&self, state: StateId) -> bool {
        self.state_status(state) == ComputationStatus::Success
    }

    /// Whether at least one state of the perimeter computed successfully.
    pub fn any_success(&self, perimeter: &OptimizationPerimeter) -> bool {
        perimeter.states().iter().any(|&s| self.is_successful(s))
    }

    pub fn state_statuses(&self, perimeter: &OptimizationPerimeter) -> Vec<(StateId, ComputationStatus)> {
        perimeter
            .states()
            .iter()
            .map(|&s| (s, self.state_status(s)))
            .collect()
    }

    /// Commercial flows of another linearization, kept when loop flows are
    /// not recomputed every iteration.
    pub fn inherit_commercial_flows(&mut self, other: &LinearizationPoint) {
        self.commercial_flows = other.commercial_flows.clone();
    }

    /// PTDF sums of another linearization, kept when they are not refreshed.
    pub fn inherit_ptdf_sums(&mut self, other: &LinearizationPoint) {
        self.ptdf_sums = other.ptdf_sums.clone();
    }
}

/// External load-flow / sensitivity solver.
///
/// `compute` is a blocking request/response call. An `Err` aborts the run
/// with a computation-failure status (structural errors are propagated).
pub trait SensitivityEngine {
    fn compute(
        &mut self,
        perimeter: &OptimizationPerimeter,
        setpoints: &SetpointAssignment,
    ) -> RaoResult<LinearizationPoint>;
}

impl<E: SensitivityEngine + ?Sized> SensitivityEngine for Box<E> {
    fn compute(
        &mut self,
        perimeter: &OptimizationPerimeter,
        setpoints: &SetpointAssignment,
    ) -> RaoResult<LinearizationPoint> {
        (**self).compute(perimeter, setpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_entries() {
        let mut point = LinearizationPoint::new();
        let cnec = CnecId::new(0);
        assert_eq!(point.flow(cnec, Side::One), None);
        assert_eq!(point.commercial_flow(cnec, Side::One), 0.0);
        assert!(point.is_successful(StateId::new(3)));

        point.set_flow(cnec, Side::One, 120.0);
        point.set_commercial_flow(cnec, Side::One, 70.0);
        assert_eq!(point.loop_flow(cnec, Side::One), Some(50.0));
        point.set_state_status(StateId::new(3), ComputationStatus::Failure);
        assert!(!point.is_successful(StateId::new(3)));
    }

    #[test]
    fn test_inherit_auxiliary_data() {
        let mut first = LinearizationPoint::new();
        first.set_ptdf_sum(CnecId::new(1), 0.4);
        first.set_commercial_flow(CnecId::new(1), Side::Two, 12.0);
        let mut second = LinearizationPoint::new();
        second.inherit_ptdf_sums(&first);
        second.inherit_commercial_flows(&first);
        assert_eq!(second.ptdf_sum(CnecId::new(1)), Some(0.4));
        assert_eq!(second.commercial_flow(CnecId::new(1), Side::Two), 12.0);
    }
}
