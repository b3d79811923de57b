//! Serializable summary of an optimisation run.

use rao_core::{OptimizationPerimeter, RaoError, RaoResult};
use serde::{Deserialize, Serialize};

use crate::controller::{ControllerState, IterationRecord, LinearOptimizationResult, LinearOptimizationStatus};
use crate::sensitivity::ComputationStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedSetpoint {
    pub range_action: String,
    pub state: String,
    pub setpoint: f64,
    /// Phase shifters only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub status: LinearOptimizationStatus,
    pub final_state: ControllerState,
    pub iterations: u32,
    pub initial_cost: f64,
    pub cost: f64,
    pub worst_margin: Option<f64>,
    pub setpoints: Vec<ActivatedSetpoint>,
    pub failed_states: Vec<String>,
    pub infeasible_ranges: Vec<String>,
    pub history: Vec<IterationRecord>,
}

impl OptimizationReport {
    pub fn new(perimeter: &OptimizationPerimeter, result: &LinearOptimizationResult) -> Self {
        let setpoints = result
            .setpoints
            .activated()
            .map(|(ra, state, setpoint)| {
                let action = perimeter.range_action(ra);
                ActivatedSetpoint {
                    range_action: action.name.clone(),
                    state: perimeter.state(state).label(),
                    setpoint,
                    tap: action.angle_to_tap(setpoint),
                }
            })
            .collect();
        let failed_states = result
            .state_status
            .iter()
            .filter(|(_, status)| *status == ComputationStatus::Failure)
            .map(|(state, _)| perimeter.state(*state).label())
            .collect();
        Self {
            status: result.status,
            final_state: result.final_state,
            iterations: result.iterations,
            initial_cost: result.initial_objective.cost(),
            cost: result.cost(),
            worst_margin: result.objective.worst_margin,
            setpoints,
            failed_states,
            infeasible_ranges: result.infeasible_ranges.iter().map(|r| r.to_string()).collect(),
            history: result.history.clone(),
        }
    }

    pub fn to_json_pretty(&self) -> RaoResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| RaoError::Other(e.to_string()))
    }
}
