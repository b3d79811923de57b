#![allow(dead_code)]

use rao_algo::test_utils::SyntheticEngine;
use rao_algo::*;
use rao_core::*;
use tracing_subscriber::EnvFilter;

/// Route optimiser logs to the test output (`RUST_LOG=rao_algo=debug`).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One preventive state, one cnec `F ≤ 100` with reference flow 120 and one
/// HVDC-like control of sensitivity −1 MW/MW, admissible in `[0, max]`.
pub struct SingleLine {
    pub perimeter: OptimizationPerimeter,
    pub state: StateId,
    pub cnec: CnecId,
    pub range_action: RangeActionId,
}

impl SingleLine {
    pub fn new(max_setpoint: f64) -> Self {
        let mut builder = PerimeterBuilder::new();
        let state = builder.add_state(Instant::preventive(), None);
        let cnec = builder.add_cnec(
            Cnec::new("line", state).with_threshold(Threshold::megawatt(Side::One, None, Some(100.0))),
        );
        let range_action =
            builder.add_range_action(RangeAction::hvdc("hvdc", 0.0, max_setpoint, 0.0));
        builder.make_available(range_action, state);
        Self {
            perimeter: builder.build().unwrap(),
            state,
            cnec,
            range_action,
        }
    }

    pub fn engine(&self) -> SyntheticEngine {
        SyntheticEngine::new()
            .with_flow(self.cnec, Side::One, 120.0)
            .with_sensitivity(self.cnec, Side::One, self.range_action, -1.0)
    }
}

pub fn optimize(
    perimeter: &OptimizationPerimeter,
    parameters: &LinearOptimizerParameters,
    engine: &mut dyn SensitivityEngine,
) -> LinearOptimizationResult {
    IteratingLinearOptimizer::optimize(
        LinearOptimizerInput {
            perimeter,
            parameters,
            initial_linearization: None,
            deadline: None,
        },
        engine,
        &GoodLpBackend::default(),
    )
    .unwrap()
}
