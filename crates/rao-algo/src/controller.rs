//! Iterating linear optimiser.
//!
//! ```text
//! Initialized ─▶ Solving ─▶ Evaluating ─▶ Iterating ─▶ Solving ─▶ …
//!                   │            │
//!                   ▼            ▼
//!               Infeasible   Converged / MaxIterReached
//! ```
//!
//! Each iteration solves the linear problem built around the working point,
//! rounds the setpoints, asks the sensitivity engine for the true flows and
//! evaluates the true objective. A candidate is kept only when it improves
//! the best cost seen so far; otherwise the best assignment is restored
//! (rollback), so the returned cost never exceeds the initial one.
//!
//! The sensitivity engine and solver calls are blocking. A deadline is
//! checked between phases and bounds each solver call.

use rao_core::{OptimizationPerimeter, RaoError, RaoResult, StateId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::admissibility::{AdmissibilityResolver, AdmissibleRanges, RangeInfeasibility};
use crate::fillers::{fillers_for, FillContext};
use crate::linear_problem::{LinearProblem, LinearProblemStatus, LpBackend, VariableKey};
use crate::objective::{ObjectiveFunction, ObjectiveValue};
use crate::parameters::LinearOptimizerParameters;
use crate::rounding::round_setpoint;
use crate::sensitivity::{ComputationStatus, LinearizationPoint, SensitivityEngine};
use crate::setpoints::SetpointAssignment;

/// Setpoints closer than this are considered unchanged.
const SETPOINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Initialized,
    Solving,
    Evaluating,
    Iterating,
    Converged,
    MaxIterReached,
    Infeasible,
    TimedOut,
    ComputationFailed,
}

/// Outcome of an optimisation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearOptimizationStatus {
    Feasible,
    Infeasible,
    MaxIterationReached,
    Timeout,
    SensitivityComputationFailed,
}

impl fmt::Display for LinearOptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinearOptimizationStatus::Feasible => "feasible",
            LinearOptimizationStatus::Infeasible => "infeasible",
            LinearOptimizationStatus::MaxIterationReached => "max iteration reached",
            LinearOptimizationStatus::Timeout => "timeout",
            LinearOptimizationStatus::SensitivityComputationFailed => {
                "sensitivity computation failed"
            }
        };
        f.write_str(s)
    }
}

/// One solve / evaluate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub cost: f64,
    pub worst_margin: Option<f64>,
    pub accepted: bool,
}

pub struct LinearOptimizerInput<'a> {
    pub perimeter: &'a OptimizationPerimeter,
    pub parameters: &'a LinearOptimizerParameters,
    /// Linearization at the pre-optimisation setpoints; computed when absent.
    pub initial_linearization: Option<LinearizationPoint>,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct LinearOptimizationResult {
    pub status: LinearOptimizationStatus,
    pub final_state: ControllerState,
    /// States visited by the controller, in order.
    pub state_path: Vec<ControllerState>,
    pub iterations: u32,
    /// Best assignment found.
    pub setpoints: SetpointAssignment,
    pub objective: ObjectiveValue,
    pub initial_objective: ObjectiveValue,
    /// Linearization of the best assignment.
    pub linearization: LinearizationPoint,
    pub state_status: Vec<(StateId, ComputationStatus)>,
    pub infeasible_ranges: Vec<RangeInfeasibility>,
    pub history: Vec<IterationRecord>,
}

impl LinearOptimizationResult {
    pub fn cost(&self) -> f64 {
        self.objective.cost()
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    setpoints: SetpointAssignment,
    linearization: LinearizationPoint,
    objective: ObjectiveValue,
}

pub struct IteratingLinearOptimizer;

impl IteratingLinearOptimizer {
    /// Run the optimisation loop on one perimeter.
    ///
    /// Degraded outcomes (infeasible problem, engine failure, timeout) are
    /// reported through [`LinearOptimizationStatus`] with the best assignment
    /// found. `Err` is reserved for structural and configuration errors.
    pub fn optimize(
        input: LinearOptimizerInput<'_>,
        engine: &mut dyn SensitivityEngine,
        backend: &dyn LpBackend,
    ) -> RaoResult<LinearOptimizationResult> {
        let LinearOptimizerInput {
            perimeter,
            parameters,
            initial_linearization,
            deadline,
        } = input;
        parameters.validate()?;
        if parameters.needs_integer_variables() && !backend.supports_integers() {
            return Err(RaoError::Config(format!(
                "the relative margin objective and range action usage limits need a MILP back end, {} does not support integers",
                backend.id()
            )));
        }

        let ranges = AdmissibilityResolver::new(perimeter).resolve_all();
        let mut run = Run {
            perimeter,
            parameters,
            ranges: &ranges,
            deadline,
            state: ControllerState::Initialized,
            state_path: vec![ControllerState::Initialized],
            history: Vec::new(),
            iterations: 0,
        };
        run.execute(initial_linearization, engine, backend)
    }
}

struct Run<'a> {
    perimeter: &'a OptimizationPerimeter,
    parameters: &'a LinearOptimizerParameters,
    ranges: &'a AdmissibleRanges,
    deadline: Option<Instant>,
    state: ControllerState,
    state_path: Vec<ControllerState>,
    history: Vec<IterationRecord>,
    iterations: u32,
}

enum EngineOutcome {
    Computed(LinearizationPoint),
    Failed,
}

impl<'a> Run<'a> {
    fn execute(
        &mut self,
        initial_linearization: Option<LinearizationPoint>,
        engine: &mut dyn SensitivityEngine,
        backend: &dyn LpBackend,
    ) -> RaoResult<LinearOptimizationResult> {
        let start = Instant::now();
        let initial_setpoints = SetpointAssignment::new(self.perimeter);
        let (initial_linearization, engine_failed) = match initial_linearization {
            Some(linearization) => (linearization, false),
            None => match self.compute(engine, &initial_setpoints)? {
                EngineOutcome::Computed(linearization) => (linearization, false),
                EngineOutcome::Failed => (LinearizationPoint::new(), true),
            },
        };

        let objective_function = ObjectiveFunction::new(
            self.perimeter,
            self.ranges,
            self.parameters,
            &initial_linearization,
        );
        let initial_objective = objective_function.evaluate(&initial_linearization, &initial_setpoints);
        let mut best = Candidate {
            setpoints: initial_setpoints,
            linearization: initial_linearization.clone(),
            objective: initial_objective,
        };

        if engine_failed || !initial_linearization.any_success(self.perimeter) {
            warn!("initial sensitivity computation failed on every state");
            self.transition(ControllerState::ComputationFailed);
            return Ok(self.finish(
                LinearOptimizationStatus::SensitivityComputationFailed,
                best,
                initial_objective,
            ));
        }
        info!(
            cost = initial_objective.cost(),
            worst_margin = ?initial_objective.worst_margin,
            range_actions = self.ranges.len(),
            "starting linear optimisation"
        );
        if self.ranges.is_empty() {
            debug!("no range action to optimise");
            self.transition(ControllerState::Converged);
            return Ok(self.finish(LinearOptimizationStatus::Feasible, best, initial_objective));
        }

        let fillers = fillers_for(self.parameters);
        let mut problem = LinearProblem::new();
        let mut working = best.clone();
        {
            let ctx = self.context(&working, &initial_linearization, 0);
            for filler in &fillers {
                filler.fill(&mut problem, &ctx)?;
            }
        }
        debug!(
            variables = problem.num_variables(),
            constraints = problem.num_constraints(),
            "linear problem built"
        );

        loop {
            if self.deadline_passed() {
                return Ok(self.timed_out(best, initial_objective));
            }
            self.iterations += 1;
            let iteration = self.iterations;
            self.transition(ControllerState::Solving);

            let status = problem.solve(backend, self.solver_time_limit())?;
            match status {
                LinearProblemStatus::Optimal => {}
                LinearProblemStatus::TimeLimit => {
                    warn!(iteration, "solver hit its time limit");
                    return Ok(self.timed_out(best, initial_objective));
                }
                other => {
                    warn!(iteration, status = %other, "linear problem could not be solved");
                    self.transition(ControllerState::Infeasible);
                    return Ok(self.finish(LinearOptimizationStatus::Infeasible, best, initial_objective));
                }
            }

            let candidate_setpoints = self.extract_setpoints(&problem)?;
            if candidate_setpoints.same_setpoints(&working.setpoints, SETPOINT_TOLERANCE) {
                info!(iteration, "setpoints unchanged, stopping");
                self.transition(ControllerState::Converged);
                return Ok(self.finish(LinearOptimizationStatus::Feasible, best, initial_objective));
            }
            if self.deadline_passed() {
                return Ok(self.timed_out(best, initial_objective));
            }

            self.transition(ControllerState::Evaluating);
            let mut linearization = match self.compute(engine, &candidate_setpoints)? {
                EngineOutcome::Computed(linearization) if linearization.any_success(self.perimeter) => {
                    linearization
                }
                _ => {
                    self.transition(ControllerState::ComputationFailed);
                    return Ok(self.finish(
                        LinearOptimizationStatus::SensitivityComputationFailed,
                        best,
                        initial_objective,
                    ));
                }
            };
            if !self.parameters.relative_margin.update_ptdf_sums_each_iteration {
                linearization.inherit_ptdf_sums(&initial_linearization);
            }
            if !self.parameters.loop_flow.update_commercial_flows_each_iteration {
                linearization.inherit_commercial_flows(&initial_linearization);
            }

            let objective = objective_function.evaluate(&linearization, &candidate_setpoints);
            let improvement = best.objective.cost() - objective.cost();
            let candidate = Candidate {
                setpoints: candidate_setpoints,
                linearization,
                objective,
            };
            let accepted = improvement > 0.0;
            self.history.push(IterationRecord {
                iteration,
                cost: objective.cost(),
                worst_margin: objective.worst_margin,
                accepted,
            });

            if improvement > self.parameters.objective_tolerance {
                info!(iteration, cost = objective.cost(), improvement, "better solution found");
                best = candidate.clone();
                working = candidate;
            } else if accepted {
                info!(iteration, cost = objective.cost(), improvement, "improvement below tolerance, stopping");
                best = candidate;
                self.transition(ControllerState::Converged);
                return Ok(self.finish(LinearOptimizationStatus::Feasible, best, initial_objective));
            } else if self.parameters.ra_range_shrinking {
                info!(iteration, cost = objective.cost(), "worse solution, keeping best and shrinking ranges");
                working = candidate;
            } else {
                info!(iteration, cost = objective.cost(), "worse solution, rolling back");
                self.transition(ControllerState::Converged);
                return Ok(self.finish(LinearOptimizationStatus::Feasible, best, initial_objective));
            }

            if iteration >= self.parameters.max_iterations {
                info!(iterations = iteration, elapsed = ?start.elapsed(), "maximum number of iterations reached");
                self.transition(ControllerState::MaxIterReached);
                return Ok(self.finish(
                    LinearOptimizationStatus::MaxIterationReached,
                    best,
                    initial_objective,
                ));
            }

            self.transition(ControllerState::Iterating);
            let ctx = self.context(&working, &initial_linearization, iteration);
            for filler in &fillers {
                filler.update_between_sensi_iteration(&mut problem, &ctx)?;
            }
        }
    }

    fn context<'c>(
        &'c self,
        working: &'c Candidate,
        initial_linearization: &'c LinearizationPoint,
        iteration: u32,
    ) -> FillContext<'c> {
        FillContext {
            perimeter: self.perimeter,
            ranges: self.ranges,
            linearization: &working.linearization,
            initial_linearization,
            setpoints: &working.setpoints,
            parameters: self.parameters,
            iteration,
        }
    }

    /// Structural errors propagate; any other engine error is a failed computation.
    fn compute(
        &self,
        engine: &mut dyn SensitivityEngine,
        setpoints: &SetpointAssignment,
    ) -> RaoResult<EngineOutcome> {
        match engine.compute(self.perimeter, setpoints) {
            Ok(linearization) => Ok(EngineOutcome::Computed(linearization)),
            Err(e) if e.is_structural() => Err(e),
            Err(e) => {
                warn!(error = %e, "sensitivity computation failed");
                Ok(EngineOutcome::Failed)
            }
        }
    }

    /// Rounded solver setpoints of every optimised pair.
    fn extract_setpoints(&self, problem: &LinearProblem) -> RaoResult<SetpointAssignment> {
        let mut setpoints = SetpointAssignment::new(self.perimeter);
        for (range_action, state, range) in self.ranges.iter() {
            let variable = problem
                .variable(&VariableKey::Setpoint { range_action, state })
                .ok_or_else(|| {
                    RaoError::Structural(format!(
                        "no setpoint variable for range action {} at state {}",
                        range_action.value(),
                        state.value()
                    ))
                })?;
            let value = problem
                .value(variable)
                .ok_or_else(|| RaoError::Solver("solved problem has no setpoint value".into()))?;
            let action = self.perimeter.range_action(range_action);
            let rounded = round_setpoint(action, range, value, self.parameters.round_continuous_setpoints);
            setpoints.set(range_action, state, rounded);
        }
        Ok(setpoints)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn solver_time_limit(&self) -> Option<Duration> {
        let remaining = self
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        match (self.parameters.solver_time_limit(), remaining) {
            (Some(limit), Some(remaining)) => Some(limit.min(remaining)),
            (limit, remaining) => limit.or(remaining),
        }
    }

    fn transition(&mut self, next: ControllerState) {
        debug!(from = ?self.state, to = ?next, "controller transition");
        self.state = next;
        self.state_path.push(next);
    }

    fn timed_out(&mut self, best: Candidate, initial_objective: ObjectiveValue) -> LinearOptimizationResult {
        warn!(iterations = self.iterations, "deadline reached, returning best solution");
        self.transition(ControllerState::TimedOut);
        self.finish(LinearOptimizationStatus::Timeout, best, initial_objective)
    }

    fn finish(
        &mut self,
        status: LinearOptimizationStatus,
        best: Candidate,
        initial_objective: ObjectiveValue,
    ) -> LinearOptimizationResult {
        info!(
            %status,
            iterations = self.iterations,
            cost = best.objective.cost(),
            worst_margin = ?best.objective.worst_margin,
            "linear optimisation finished"
        );
        LinearOptimizationResult {
            status,
            final_state: self.state,
            state_path: std::mem::take(&mut self.state_path),
            iterations: self.iterations,
            state_status: best.linearization.state_statuses(self.perimeter),
            setpoints: best.setpoints,
            objective: best.objective,
            initial_objective,
            linearization: best.linearization,
            infeasible_ranges: self.ranges.infeasible().to_vec(),
            history: std::mem::take(&mut self.history),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fillers::fixtures::Fixture;
    use crate::linear_problem::GoodLpBackend;
    use crate::parameters::{ObjectiveKind, RaUsageLimits};
    use rao_core::{CnecId, RangeActionId, Side};

    /// Linear flows: `120 − (s − 0)`.
    struct Linear;

    impl SensitivityEngine for Linear {
        fn compute(
            &mut self,
            _perimeter: &OptimizationPerimeter,
            setpoints: &SetpointAssignment,
        ) -> RaoResult<LinearizationPoint> {
            let s = setpoints.setpoint(RangeActionId::new(0), StateId::new(0));
            let mut point = LinearizationPoint::new();
            point.set_flow(CnecId::new(0), Side::One, 120.0 - s);
            point.set_sensitivity(CnecId::new(0), Side::One, RangeActionId::new(0), -1.0);
            Ok(point)
        }
    }

    #[test]
    fn test_state_path() {
        let fixture = Fixture::new(50.0);
        let result = IteratingLinearOptimizer::optimize(
            LinearOptimizerInput {
                perimeter: &fixture.perimeter,
                parameters: &fixture.parameters,
                initial_linearization: None,
                deadline: None,
            },
            &mut Linear,
            &GoodLpBackend::default(),
        )
        .unwrap();
        assert_eq!(result.status, LinearOptimizationStatus::Feasible);
        assert_eq!(
            result.state_path,
            vec![
                ControllerState::Initialized,
                ControllerState::Solving,
                ControllerState::Evaluating,
                ControllerState::Iterating,
                ControllerState::Solving,
                ControllerState::Converged,
            ]
        );
        assert_eq!(result.iterations, 2);
        assert_eq!(result.history.len(), 1);
        assert!(result.history[0].accepted);
    }

    #[test]
    fn test_relative_objective_needs_integer_support() {
        let mut fixture = Fixture::new(50.0);
        fixture.parameters.objective = ObjectiveKind::MaxMinRelativeMargin;
        let err = IteratingLinearOptimizer::optimize(
            LinearOptimizerInput {
                perimeter: &fixture.perimeter,
                parameters: &fixture.parameters,
                initial_linearization: None,
                deadline: None,
            },
            &mut Linear,
            &GoodLpBackend::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RaoError::Config(_)));
    }

    #[test]
    fn test_usage_limits_need_integer_support() {
        let mut fixture = Fixture::new(50.0);
        fixture.parameters.ra_usage_limits.insert(
            "preventive".into(),
            RaUsageLimits {
                max_ra: Some(0),
                ..RaUsageLimits::default()
            },
        );
        let err = IteratingLinearOptimizer::optimize(
            LinearOptimizerInput {
                perimeter: &fixture.perimeter,
                parameters: &fixture.parameters,
                initial_linearization: None,
                deadline: None,
            },
            &mut Linear,
            &GoodLpBackend::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RaoError::Config(_)));
    }

    #[test]
    fn test_time_limit_is_capped_by_deadline() {
        let fixture = Fixture::new(50.0);
        let mut parameters = fixture.parameters.clone();
        parameters.solver_time_limit_secs = Some(3600.0);
        let run = Run {
            perimeter: &fixture.perimeter,
            parameters: &parameters,
            ranges: &fixture.ranges,
            deadline: Some(Instant::now() + Duration::from_secs(10)),
            state: ControllerState::Initialized,
            state_path: Vec::new(),
            history: Vec::new(),
            iterations: 0,
        };
        let limit = run.solver_time_limit().unwrap();
        assert!(limit <= Duration::from_secs(10));
    }
}
