//! Linear solver back ends.
//!
//! [`LpBackend`] is the replaceable seam between the solver-agnostic
//! [`LinearProblem`] and an actual solver. [`GoodLpBackend`] translates the
//! problem into a `good_lp` model for the solver picked by [`LpSolverKind`]:
//!
//! | Kind | Feature | Problem classes |
//! |------|---------|-----------------|
//! | `clarabel` | `solver-clarabel` (default) | LP |
//! | `highs` | `solver-highs` | LP, MILP, time limit |

use anyhow::anyhow;
#[cfg(feature = "solver-clarabel")]
use good_lp::solvers::clarabel::clarabel;
#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs;
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{LinearProblem, LinearProblemStatus, VariableKind};
use rao_core::{RaoError, RaoResult};

/// Status and variable values returned by a back end.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub status: LinearProblemStatus,
    /// One value per variable, in variable order (empty unless optimal).
    pub values: Vec<f64>,
}

impl LpSolution {
    pub fn failed(status: LinearProblemStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
        }
    }
}

/// Solver back end (strategy pattern).
///
/// Implementations must be `Send + Sync` so that independent perimeters can
/// be optimised concurrently with their own back end.
pub trait LpBackend: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Whether integer and binary variables are honoured.
    fn supports_integers(&self) -> bool;

    /// Solve `problem`, minimising its objective.
    fn solve(&self, problem: &LinearProblem, time_limit: Option<Duration>) -> RaoResult<LpSolution>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpSolverKind {
    #[default]
    Clarabel,
    #[cfg(feature = "solver-highs")]
    Highs,
}

impl LpSolverKind {
    pub fn available() -> &'static [&'static str] {
        AVAILABLE_LP_SOLVERS
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LpSolverKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => "highs",
        }
    }

    pub fn supports_integers(&self) -> bool {
        match self {
            LpSolverKind::Clarabel => false,
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => true,
        }
    }
}

const AVAILABLE_LP_SOLVERS: &[&str] = &[
    "clarabel",
    #[cfg(feature = "solver-highs")]
    "highs",
];

fn unknown_solver_error(label: &str) -> anyhow::Error {
    anyhow!(
        "unknown lp solver '{}'; supported values: {}",
        label,
        LpSolverKind::available().join(", ")
    )
}

impl FromStr for LpSolverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.to_ascii_lowercase();
        match normalized.as_str() {
            "clarabel" => Ok(LpSolverKind::Clarabel),
            "highs" => {
                #[cfg(feature = "solver-highs")]
                {
                    Ok(LpSolverKind::Highs)
                }
                #[cfg(not(feature = "solver-highs"))]
                {
                    Err(unknown_solver_error(&normalized))
                }
            }
            other => Err(unknown_solver_error(other)),
        }
    }
}

/// Back end built on `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend {
    kind: LpSolverKind,
}

impl GoodLpBackend {
    pub fn new(kind: LpSolverKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> LpSolverKind {
        self.kind
    }
}

impl LpBackend for GoodLpBackend {
    fn id(&self) -> &'static str {
        self.kind.as_str()
    }

    fn supports_integers(&self) -> bool {
        self.kind.supports_integers()
    }

    fn solve(&self, problem: &LinearProblem, time_limit: Option<Duration>) -> RaoResult<LpSolution> {
        if problem.has_integer_variables() && !self.supports_integers() {
            error!(
                solver = self.id(),
                "linear problem has integer variables but the solver only handles continuous ones"
            );
            return Ok(LpSolution::failed(LinearProblemStatus::Abnormal));
        }
        if problem.num_variables() == 0 {
            return Ok(LpSolution {
                status: LinearProblemStatus::Optimal,
                values: Vec::new(),
            });
        }

        let mut vars = ProblemVariables::new();
        let handles: Vec<Variable> = problem
            .variables()
            .iter()
            .map(|data| {
                let mut definition = variable();
                match data.kind {
                    VariableKind::Binary => definition = definition.binary(),
                    VariableKind::Integer => definition = definition.integer(),
                    VariableKind::Continuous => {}
                }
                if data.lb.is_finite() {
                    definition = definition.min(data.lb);
                }
                if data.ub.is_finite() {
                    definition = definition.max(data.ub);
                }
                vars.add(definition)
            })
            .collect();

        let mut objective = Expression::from(0.0);
        for (id, coefficient) in problem.objective_terms() {
            objective += coefficient * handles[id.value()];
        }

        let mut constraints: Vec<Constraint> = Vec::with_capacity(problem.num_constraints());
        for data in problem.constraints() {
            if data.coefficients.is_empty() {
                // constant row: either trivially satisfied or the problem is infeasible
                if data.lb > 1e-9 || data.ub < -1e-9 {
                    debug!(constraint = ?data.key, "empty constraint excludes zero");
                    return Ok(LpSolution::failed(LinearProblemStatus::Infeasible));
                }
                continue;
            }
            let mut expr = Expression::from(0.0);
            for (id, coefficient) in &data.coefficients {
                expr += *coefficient * handles[id.value()];
            }
            match (data.lb.is_finite(), data.ub.is_finite()) {
                (true, true) if data.lb == data.ub => {
                    constraints.push(constraint!(expr == data.lb));
                }
                (true, true) => {
                    constraints.push(constraint!(expr.clone() >= data.lb));
                    constraints.push(constraint!(expr <= data.ub));
                }
                (true, false) => constraints.push(constraint!(expr >= data.lb)),
                (false, true) => constraints.push(constraint!(expr <= data.ub)),
                // relaxed constraint
                (false, false) => {}
            }
        }

        let unsolved = vars.minimise(objective);
        let solution = match self.kind {
            #[cfg(feature = "solver-clarabel")]
            LpSolverKind::Clarabel => {
                if time_limit.is_some() {
                    debug!("clarabel back end ignores the solver time limit");
                }
                run_model(unsolved.using(clarabel), constraints, &handles)
            }
            #[cfg(not(feature = "solver-clarabel"))]
            LpSolverKind::Clarabel => {
                return Err(RaoError::Config(
                    "clarabel back end requires the solver-clarabel feature".into(),
                ));
            }
            #[cfg(feature = "solver-highs")]
            LpSolverKind::Highs => {
                let mut model = unsolved.using(highs);
                if let Some(limit) = time_limit {
                    model = model.set_time_limit(limit.as_secs_f64());
                }
                run_model(model, constraints, &handles)
            }
        };
        Ok(solution)
    }
}

fn run_model<M>(mut model: M, constraints: Vec<Constraint>, handles: &[Variable]) -> LpSolution
where
    M: SolverModel<Error = ResolutionError>,
{
    for c in constraints {
        model = model.with(c);
    }
    match model.solve() {
        Ok(solution) => LpSolution {
            status: LinearProblemStatus::Optimal,
            values: handles.iter().map(|v| solution.value(*v)).collect(),
        },
        Err(err) => LpSolution::failed(status_from_error(&err)),
    }
}

fn status_from_error(err: &ResolutionError) -> LinearProblemStatus {
    match err {
        ResolutionError::Infeasible => LinearProblemStatus::Infeasible,
        ResolutionError::Unbounded => LinearProblemStatus::Unbounded,
        other => {
            let message = other.to_string();
            if message.to_ascii_lowercase().contains("time") {
                LinearProblemStatus::TimeLimit
            } else {
                warn!(error = %message, "linear solver failed");
                LinearProblemStatus::Abnormal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_problem::{ConstraintKey, VariableKey};
    use rao_core::{CnecId, Side};

    fn assert_object_safe(_: &dyn LpBackend) {}

    #[test]
    fn test_backend_is_object_safe() {
        let backend = GoodLpBackend::default();
        assert_object_safe(&backend);
        assert_eq!(backend.id(), "clarabel");
        assert!(!backend.supports_integers());
    }

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("Clarabel".parse::<LpSolverKind>().unwrap(), LpSolverKind::Clarabel);
        let err = "cplex".parse::<LpSolverKind>().unwrap_err();
        assert!(err.to_string().contains("supported values"));
    }

    #[test]
    fn test_solves_small_lp() {
        // max x subject to x + y <= 4, x - y == 1, y in [0, 10]
        let mut problem = LinearProblem::new();
        let x = problem.variable_or_insert(
            VariableKey::MinimumMargin,
            -LinearProblem::infinity(),
            LinearProblem::infinity(),
            VariableKind::Continuous,
        );
        let y = problem.variable_or_insert(
            VariableKey::Flow {
                cnec: CnecId::new(0),
                side: Side::One,
            },
            0.0,
            10.0,
            VariableKind::Continuous,
        );
        let sum = problem
            .add_constraint(ConstraintKey::MarginSignAbsolute, -LinearProblem::infinity(), 4.0)
            .unwrap();
        problem.set_coefficient(sum, x, 1.0);
        problem.set_coefficient(sum, y, 1.0);
        let diff = problem
            .add_constraint(ConstraintKey::MarginSignRelative, 1.0, 1.0)
            .unwrap();
        problem.set_coefficient(diff, x, 1.0);
        problem.set_coefficient(diff, y, -1.0);
        problem.set_objective_coefficient(x, -1.0);

        let status = problem.solve(&GoodLpBackend::default(), None).unwrap();
        assert_eq!(status, LinearProblemStatus::Optimal);
        assert!((problem.value(x).unwrap() - 2.5).abs() < 1e-5);
        assert!((problem.value(y).unwrap() - 1.5).abs() < 1e-5);
        assert!((problem.activity(sum).unwrap() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_reports_infeasible() {
        let mut problem = LinearProblem::new();
        let x = problem.variable_or_insert(
            VariableKey::MinimumMargin,
            0.0,
            1.0,
            VariableKind::Continuous,
        );
        let c = problem
            .add_constraint(ConstraintKey::MarginSignAbsolute, 2.0, LinearProblem::infinity())
            .unwrap();
        problem.set_coefficient(c, x, 1.0);
        problem.set_objective_coefficient(x, 1.0);
        let status = problem.solve(&GoodLpBackend::default(), None).unwrap();
        assert_eq!(status, LinearProblemStatus::Infeasible);
        assert!(problem.value(x).is_none());
    }

    #[test]
    fn test_integer_problem_on_lp_backend_is_abnormal() {
        let mut problem = LinearProblem::new();
        problem.variable_or_insert(VariableKey::MarginSign, 0.0, 1.0, VariableKind::Binary);
        let status = problem.solve(&GoodLpBackend::default(), None).unwrap();
        assert_eq!(status, LinearProblemStatus::Abnormal);
    }

    #[cfg(not(feature = "solver-clarabel"))]
    #[test]
    fn test_clarabel_needs_its_feature() {
        let mut problem = LinearProblem::new();
        let x = problem.variable_or_insert(VariableKey::MinimumMargin, 0.0, 1.0, VariableKind::Continuous);
        problem.set_objective_coefficient(x, 1.0);
        let err = problem.solve(&GoodLpBackend::default(), None).unwrap_err();
        assert!(matches!(err, RaoError::Config(_)));
    }

    #[cfg(feature = "solver-highs")]
    #[test]
    fn test_highs_solves_binary_problem() {
        let mut problem = LinearProblem::new();
        let b = problem.variable_or_insert(VariableKey::MarginSign, 0.0, 1.0, VariableKind::Binary);
        problem.set_objective_coefficient(b, -1.0);
        let status = problem
            .solve(&GoodLpBackend::new(LpSolverKind::Highs), None)
            .unwrap();
        assert_eq!(status, LinearProblemStatus::Optimal);
        assert!((problem.value(b).unwrap() - 1.0).abs() < 1e-6);
    }
}
