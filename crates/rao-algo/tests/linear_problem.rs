//! The filled linear problem reproduces the linearised flows.

use rao_algo::linear_problem::VariableKey;
use rao_algo::test_utils::SyntheticEngine;
use rao_algo::*;
use rao_core::*;

struct TwoLines {
    perimeter: OptimizationPerimeter,
    state: StateId,
    lines: [CnecId; 2],
    hvdcs: [RangeActionId; 2],
    engine: SyntheticEngine,
}

fn two_lines() -> TwoLines {
    let mut builder = PerimeterBuilder::new();
    let state = builder.add_state(Instant::preventive(), None);
    let a = builder.add_cnec(
        Cnec::new("a", state).with_threshold(Threshold::megawatt(Side::One, Some(-100.0), Some(100.0))),
    );
    let b = builder.add_cnec(
        Cnec::new("b", state).with_threshold(Threshold::megawatt(Side::One, Some(-100.0), Some(100.0))),
    );
    let first = builder.add_range_action(RangeAction::hvdc("first", -100.0, 100.0, 10.0));
    let second = builder.add_range_action(RangeAction::hvdc("second", -100.0, 100.0, -5.0));
    builder.make_available(first, state);
    builder.make_available(second, state);
    let engine = SyntheticEngine::new()
        .with_flow(a, Side::One, 120.0)
        .with_sensitivity(a, Side::One, first, -1.0)
        .with_sensitivity(a, Side::One, second, 0.5)
        .with_flow(b, Side::One, 80.0)
        .with_sensitivity(b, Side::One, first, 0.2)
        .with_sensitivity(b, Side::One, second, -0.8);
    TwoLines {
        perimeter: builder.build().unwrap(),
        state,
        lines: [a, b],
        hvdcs: [first, second],
        engine,
    }
}

#[test]
fn test_solved_flows_match_linearisation() {
    let mut case = two_lines();
    let parameters = LinearOptimizerParameters::default();
    let ranges = AdmissibilityResolver::new(&case.perimeter).resolve_all();
    let setpoints = SetpointAssignment::new(&case.perimeter);
    let linearization = case.engine.compute(&case.perimeter, &setpoints).unwrap();
    let ctx = FillContext {
        perimeter: &case.perimeter,
        ranges: &ranges,
        linearization: &linearization,
        initial_linearization: &linearization,
        setpoints: &setpoints,
        parameters: &parameters,
        iteration: 0,
    };

    let mut problem = LinearProblem::new();
    for filler in fillers_for(&parameters) {
        filler.fill(&mut problem, &ctx).unwrap();
    }
    let status = problem.solve(&GoodLpBackend::default(), None).unwrap();
    assert_eq!(status, LinearProblemStatus::Optimal);

    let value = |key: VariableKey| problem.value(problem.variable(&key).unwrap()).unwrap();
    let solved: Vec<f64> = case
        .hvdcs
        .iter()
        .map(|&ra| {
            value(VariableKey::Setpoint {
                range_action: ra,
                state: case.state,
            })
        })
        .collect();
    let delta = [solved[0] - 10.0, solved[1] + 5.0];
    let expected = [
        120.0 - delta[0] + 0.5 * delta[1],
        80.0 + 0.2 * delta[0] - 0.8 * delta[1],
    ];
    for (line, expected) in case.lines.iter().zip(expected) {
        let flow = value(VariableKey::Flow {
            cnec: *line,
            side: Side::One,
        });
        assert!((flow - expected).abs() < 1e-4, "flow {flow}, expected {expected}");
        assert!(flow.abs() <= 100.0 + 1e-4);
    }

    let margin = value(VariableKey::MinimumMargin);
    let worst = expected
        .iter()
        .map(|flow| 100.0 - flow.abs())
        .fold(f64::INFINITY, f64::min);
    assert!((margin - worst).abs() < 1e-3, "margin {margin}, worst {worst}");
}

#[test]
fn test_problem_size_is_stable_across_updates() {
    let mut case = two_lines();
    let parameters = LinearOptimizerParameters::default();
    let ranges = AdmissibilityResolver::new(&case.perimeter).resolve_all();
    let initial = SetpointAssignment::new(&case.perimeter);
    let initial_linearization = case.engine.compute(&case.perimeter, &initial).unwrap();
    let fillers = fillers_for(&parameters);

    let mut problem = LinearProblem::new();
    let ctx = FillContext {
        perimeter: &case.perimeter,
        ranges: &ranges,
        linearization: &initial_linearization,
        initial_linearization: &initial_linearization,
        setpoints: &initial,
        parameters: &parameters,
        iteration: 0,
    };
    for filler in &fillers {
        filler.fill(&mut problem, &ctx).unwrap();
    }
    let (variables, constraints) = (problem.num_variables(), problem.num_constraints());

    let mut moved = initial.clone();
    moved.set(case.hvdcs[0], case.state, 40.0);
    let linearization = case.engine.compute(&case.perimeter, &moved).unwrap();
    let ctx = FillContext {
        linearization: &linearization,
        setpoints: &moved,
        iteration: 1,
        ..ctx
    };
    for filler in &fillers {
        filler.update_between_sensi_iteration(&mut problem, &ctx).unwrap();
    }
    assert_eq!(problem.num_variables(), variables);
    assert_eq!(problem.num_constraints(), constraints);
}
