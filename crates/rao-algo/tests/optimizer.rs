//! End-to-end runs of the iterating optimiser against the synthetic engine.

mod common;

use common::{init_logging, optimize, SingleLine};
use rao_algo::linear_problem::LpSolution;
use rao_algo::test_utils::SyntheticEngine;
use rao_algo::*;
use rao_core::*;
use std::time::Duration;

#[test]
fn test_overload_is_relieved() {
    init_logging();
    let case = SingleLine::new(50.0);
    let mut engine = case.engine();
    let result = optimize(&case.perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    assert_eq!(result.final_state, ControllerState::Converged);
    let setpoint = result.setpoints.setpoint(case.range_action, case.state);
    assert!(setpoint >= 20.0, "setpoint {setpoint}");
    assert!(result.objective.worst_margin.unwrap() >= 0.0);
    let flow = result.linearization.flow(case.cnec, Side::One).unwrap();
    assert!(flow <= 100.0 + 1e-6);
    assert!(result.cost() < result.initial_objective.cost());
}

#[test]
fn test_insufficient_range_reports_negative_margin() {
    init_logging();
    let case = SingleLine::new(10.0);
    let mut engine = case.engine();
    let result = optimize(&case.perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    let margin = result.objective.worst_margin.unwrap();
    assert!((margin + 10.0).abs() < 1e-3, "margin {margin}");
}

#[test]
fn test_worse_iteration_is_rolled_back() {
    init_logging();
    let case = SingleLine::new(50.0);
    // true flow 120 − Δ + 0.03·Δ²: the full linear step overshoots
    let mut engine = case
        .engine()
        .with_curvature(case.cnec, Side::One, case.range_action, 0.03);
    let result = optimize(&case.perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    assert_eq!(result.history.len(), 1);
    assert!(!result.history[0].accepted);
    assert!(result.history[0].cost > result.initial_objective.cost());
    // best assignment is the initial one
    assert_eq!(result.setpoints.setpoint(case.range_action, case.state), 0.0);
    assert_eq!(result.cost(), result.initial_objective.cost());
}

#[test]
fn test_range_shrinking_recovers_from_overshoot() {
    init_logging();
    let case = SingleLine::new(50.0);
    let mut engine = case
        .engine()
        .with_curvature(case.cnec, Side::One, case.range_action, 0.03);
    let parameters = LinearOptimizerParameters {
        ra_range_shrinking: true,
        ..Default::default()
    };
    let result = optimize(&case.perimeter, &parameters, &mut engine);

    assert!(matches!(
        result.status,
        LinearOptimizationStatus::Feasible | LinearOptimizationStatus::MaxIterationReached
    ));
    assert!(!result.history[0].accepted);
    assert!(result.history.iter().any(|record| record.accepted));
    assert!(result.cost() < result.initial_objective.cost());
    // accepted costs never go up
    let mut best = result.initial_objective.cost();
    for record in result.history.iter().filter(|r| r.accepted) {
        assert!(record.cost < best);
        best = record.cost;
    }
}

#[test]
fn test_same_inputs_give_same_result() {
    let case = SingleLine::new(50.0);
    let parameters = LinearOptimizerParameters::default();
    let first = optimize(&case.perimeter, &parameters, &mut case.engine());
    let second = optimize(&case.perimeter, &parameters, &mut case.engine());
    assert_eq!(first.setpoints, second.setpoints);
    assert_eq!(first.cost(), second.cost());
    assert_eq!(first.iterations, second.iterations);
}

#[test]
fn test_iteration_cap() {
    let case = SingleLine::new(50.0);
    let parameters = LinearOptimizerParameters {
        max_iterations: 1,
        ..Default::default()
    };
    let result = optimize(&case.perimeter, &parameters, &mut case.engine());
    assert_eq!(result.status, LinearOptimizationStatus::MaxIterationReached);
    assert_eq!(result.final_state, ControllerState::MaxIterReached);
    assert_eq!(result.iterations, 1);
    assert!(result.setpoints.setpoint(case.range_action, case.state) >= 20.0);
}

#[test]
fn test_expired_deadline_returns_initial_assignment() {
    let case = SingleLine::new(50.0);
    let result = IteratingLinearOptimizer::optimize(
        LinearOptimizerInput {
            perimeter: &case.perimeter,
            parameters: &LinearOptimizerParameters::default(),
            initial_linearization: None,
            deadline: Some(web_time::Instant::now() - Duration::from_millis(1)),
        },
        &mut case.engine(),
        &GoodLpBackend::default(),
    )
    .unwrap();
    assert_eq!(result.status, LinearOptimizationStatus::Timeout);
    assert_eq!(result.final_state, ControllerState::TimedOut);
    assert_eq!(result.setpoints.activated().count(), 0);
}

struct AlwaysInfeasible;

impl LpBackend for AlwaysInfeasible {
    fn id(&self) -> &'static str {
        "always-infeasible"
    }

    fn supports_integers(&self) -> bool {
        true
    }

    fn solve(&self, _problem: &LinearProblem, _time_limit: Option<Duration>) -> RaoResult<LpSolution> {
        Ok(LpSolution::failed(LinearProblemStatus::Infeasible))
    }
}

#[test]
fn test_infeasible_problem_keeps_initial_setpoints() {
    let case = SingleLine::new(50.0);
    let result = IteratingLinearOptimizer::optimize(
        LinearOptimizerInput {
            perimeter: &case.perimeter,
            parameters: &LinearOptimizerParameters::default(),
            initial_linearization: None,
            deadline: None,
        },
        &mut case.engine(),
        &AlwaysInfeasible,
    )
    .unwrap();
    assert_eq!(result.status, LinearOptimizationStatus::Infeasible);
    assert_eq!(result.final_state, ControllerState::Infeasible);
    assert_eq!(result.cost(), result.initial_objective.cost());
    assert_eq!(result.setpoints.activated().count(), 0);
}

#[test]
fn test_engine_failure_is_a_status() {
    let case = SingleLine::new(50.0);
    let parameters = LinearOptimizerParameters::default();

    let mut engine = case.engine().fail_on_call(1);
    let result = optimize(&case.perimeter, &parameters, &mut engine);
    assert_eq!(result.status, LinearOptimizationStatus::SensitivityComputationFailed);
    assert_eq!(result.iterations, 0);

    let mut engine = case.engine().fail_on_call(2);
    let result = optimize(&case.perimeter, &parameters, &mut engine);
    assert_eq!(result.status, LinearOptimizationStatus::SensitivityComputationFailed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.setpoints.activated().count(), 0);
    assert_eq!(engine.calls(), 2);
}

#[test]
fn test_failed_state_is_reported_and_ignored() {
    init_logging();
    let mut builder = PerimeterBuilder::new();
    let preventive = builder.add_state(Instant::preventive(), None);
    let outage = builder.add_state(Instant::outage(), Some("co1"));
    let line = builder.add_cnec(
        Cnec::new("line", preventive).with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
    );
    let outage_line = builder.add_cnec(
        Cnec::new("line-after-co1", outage)
            .with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
    );
    let hvdc = builder.add_range_action(RangeAction::hvdc("hvdc", 0.0, 50.0, 0.0));
    builder.make_available(hvdc, preventive);
    let perimeter = builder.build().unwrap();

    let mut engine = SyntheticEngine::new()
        .with_flow(line, Side::One, 120.0)
        .with_sensitivity(line, Side::One, hvdc, -1.0)
        .with_flow(outage_line, Side::One, 500.0)
        .with_sensitivity(outage_line, Side::One, hvdc, 0.0)
        .failing_state(outage);
    let result = optimize(&perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    assert!(result.objective.worst_margin.unwrap() >= 0.0);
    assert!(result
        .state_status
        .contains(&(outage, ComputationStatus::Failure)));
    assert!(result
        .state_status
        .contains(&(preventive, ComputationStatus::Success)));
}

#[test]
fn test_curative_action_relieves_curative_cnec() {
    let mut builder = PerimeterBuilder::new();
    let preventive = builder.add_state(Instant::preventive(), None);
    let curative = builder.add_state(Instant::curative(1), Some("co1"));
    let line = builder.add_cnec(
        Cnec::new("line", curative).with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
    );
    let hvdc = builder.add_range_action(
        RangeAction::hvdc("hvdc", -100.0, 100.0, 0.0).with_range(Range::relative_to_previous(-30.0, 30.0)),
    );
    builder.make_available(hvdc, preventive);
    builder.make_available(hvdc, curative);
    let perimeter = builder.build().unwrap();

    let mut engine = SyntheticEngine::new()
        .with_flow(line, Side::One, 150.0)
        .with_sensitivity(line, Side::One, hvdc, -1.0);
    let result = optimize(&perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    let preventive_setpoint = result.setpoints.setpoint(hvdc, preventive);
    let curative_setpoint = result.setpoints.setpoint(hvdc, curative);
    assert!(curative_setpoint >= 50.0 - 1e-3, "curative {curative_setpoint}");
    assert!((curative_setpoint - preventive_setpoint).abs() <= 30.0 + 1e-3);
}

#[test]
fn test_infeasible_range_is_excluded() {
    let (perimeter, line, broken) = {
        let mut builder = PerimeterBuilder::new();
        let state = builder.add_state(Instant::preventive(), None);
        let line = builder.add_cnec(
            Cnec::new("line", state).with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
        );
        let broken = builder.add_range_action(
            RangeAction::hvdc("broken", 0.0, 50.0, 0.0).with_range(Range::absolute(60.0, 70.0)),
        );
        builder.make_available(broken, state);
        (builder.build().unwrap(), line, broken)
    };
    let mut engine = SyntheticEngine::new()
        .with_flow(line, Side::One, 90.0)
        .with_sensitivity(line, Side::One, broken, -1.0);
    let result = optimize(&perimeter, &LinearOptimizerParameters::default(), &mut engine);

    assert_eq!(result.status, LinearOptimizationStatus::Feasible);
    assert_eq!(result.iterations, 0);
    assert_eq!(result.infeasible_ranges.len(), 1);
    assert_eq!(result.infeasible_ranges[0].name, "broken");
}

#[test]
fn test_report_serialisation() {
    let case = SingleLine::new(50.0);
    let result = optimize(&case.perimeter, &LinearOptimizerParameters::default(), &mut case.engine());
    let report = OptimizationReport::new(&case.perimeter, &result);
    assert_eq!(report.setpoints.len(), 1);
    assert_eq!(report.setpoints[0].range_action, "hvdc");
    assert_eq!(report.setpoints[0].tap, None);

    let json = report.to_json_pretty().unwrap();
    assert!(json.contains("\"status\": \"feasible\""));
    let parsed: OptimizationReport = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.status, report.status);
    assert_eq!(parsed.history.len(), report.history.len());
}
