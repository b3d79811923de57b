//! Independent perimeters optimised side by side.
//!
//! Each job owns its sensitivity engine and gets its own solver back end;
//! the immutable perimeter is shared through an `Arc`. With the `parallel`
//! feature the jobs run on the rayon pool, otherwise sequentially. Results
//! come back in job order.

use rao_core::{OptimizationPerimeter, RaoResult};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info_span;
use web_time::Instant;

use crate::controller::{IteratingLinearOptimizer, LinearOptimizationResult, LinearOptimizerInput};
use crate::linear_problem::GoodLpBackend;
use crate::parameters::LinearOptimizerParameters;
use crate::sensitivity::{LinearizationPoint, SensitivityEngine};

pub struct PerimeterJob {
    pub name: String,
    pub perimeter: Arc<OptimizationPerimeter>,
    pub engine: Box<dyn SensitivityEngine + Send>,
    pub initial_linearization: Option<LinearizationPoint>,
}

impl PerimeterJob {
    pub fn new(
        name: impl Into<String>,
        perimeter: Arc<OptimizationPerimeter>,
        engine: Box<dyn SensitivityEngine + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            perimeter,
            engine,
            initial_linearization: None,
        }
    }
}

pub struct PerimeterOutcome {
    pub name: String,
    pub result: RaoResult<LinearOptimizationResult>,
}

/// Optimise every job with the same parameters and deadline.
pub fn optimize_perimeters(
    jobs: Vec<PerimeterJob>,
    parameters: &LinearOptimizerParameters,
    deadline: Option<Instant>,
) -> Vec<PerimeterOutcome> {
    #[cfg(feature = "parallel")]
    {
        jobs.into_par_iter()
            .map(|job| run_job(job, parameters, deadline))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        jobs.into_iter()
            .map(|job| run_job(job, parameters, deadline))
            .collect()
    }
}

fn run_job(
    mut job: PerimeterJob,
    parameters: &LinearOptimizerParameters,
    deadline: Option<Instant>,
) -> PerimeterOutcome {
    let _span = info_span!("perimeter", name = %job.name).entered();
    let backend = GoodLpBackend::new(parameters.solver);
    let result = IteratingLinearOptimizer::optimize(
        LinearOptimizerInput {
            perimeter: &job.perimeter,
            parameters,
            initial_linearization: job.initial_linearization.take(),
            deadline,
        },
        job.engine.as_mut(),
        &backend,
    );
    PerimeterOutcome {
        name: job.name,
        result,
    }
}
