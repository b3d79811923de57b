//! Solver-agnostic linear problem.
//!
//! The fillers write into a [`LinearProblem`]: a plain table of variables,
//! constraints and objective coefficients, each named by a typed key. Nothing
//! is sent to a solver until [`LinearProblem::solve`] hands the table to an
//! [`LpBackend`]; between iterations the fillers only adjust bounds and
//! coefficients, so variable and constraint identities stay stable.
//!
//! Lookups are presence-checked (`Option`), never driven by errors:
//!
//! ```
//! use rao_algo::linear_problem::{LinearProblem, VariableKey, VariableKind};
//!
//! let mut problem = LinearProblem::new();
//! assert!(problem.variable(&VariableKey::MinimumMargin).is_none());
//! let m = problem.variable_or_insert(
//!     VariableKey::MinimumMargin,
//!     -LinearProblem::infinity(),
//!     LinearProblem::infinity(),
//!     VariableKind::Continuous,
//! );
//! assert_eq!(problem.variable(&VariableKey::MinimumMargin), Some(m));
//! ```

mod backend;

pub use backend::{GoodLpBackend, LpBackend, LpSolution, LpSolverKind};

use rao_core::{BoundDirection, CnecId, RaoError, RaoResult, RangeActionId, Side, StateId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Names every variable of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKey {
    Flow { cnec: CnecId, side: Side },
    Setpoint { range_action: RangeActionId, state: StateId },
    AbsoluteVariation { range_action: RangeActionId, state: StateId },
    MinimumMargin,
    MinimumRelativeMargin,
    /// 1 when the worst absolute margin is non-negative
    MarginSign,
    LoopFlowViolation { cnec: CnecId, side: Side },
    MnecViolation { cnec: CnecId, side: Side },
    /// 1 when the action moves at the state
    RangeActionUsed { range_action: RangeActionId, state: StateId },
    /// 1 when the operator moves an action counted at the limited state;
    /// `operator` indexes the sorted operator names of the perimeter.
    OperatorUsed { operator: usize, state: StateId },
}

/// Names every constraint of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKey {
    Flow { cnec: CnecId, side: Side },
    AbsoluteVariationPositive { range_action: RangeActionId, state: StateId },
    AbsoluteVariationNegative { range_action: RangeActionId, state: StateId },
    RelativeSetpoint { range_action: RangeActionId, state: StateId },
    RangeShrink { range_action: RangeActionId, state: StateId },
    InjectionBalance { state: StateId },
    MinimumMargin { cnec: CnecId, side: Side, direction: BoundDirection },
    MinimumRelativeMargin { cnec: CnecId, side: Side, direction: BoundDirection },
    /// M − BIG·b ≥ −BIG
    MarginSignAbsolute,
    /// MR − MRmax·b ≤ 0
    MarginSignRelative,
    LoopFlow { cnec: CnecId, side: Side, direction: BoundDirection },
    Mnec { cnec: CnecId, side: Side, direction: BoundDirection },
    /// AV − BIG·used ≤ ε
    RangeActionUsed { range_action: RangeActionId, state: StateId },
    MaxRa { state: StateId },
    /// operator used − action used ≥ 0, for an action counted at `limited`
    OperatorUsed { operator: usize, range_action: RangeActionId, state: StateId, limited: StateId },
    MaxTso { state: StateId },
    MaxRaPerTso { operator: usize, state: StateId },
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::Flow { cnec, side } => write!(f, "flow_{}_{}", cnec.value(), side),
            VariableKey::Setpoint {
                range_action,
                state,
            } => write!(f, "setpoint_{}_{}", range_action.value(), state.value()),
            VariableKey::AbsoluteVariation {
                range_action,
                state,
            } => write!(f, "absvariation_{}_{}", range_action.value(), state.value()),
            VariableKey::MinimumMargin => write!(f, "minmargin"),
            VariableKey::MinimumRelativeMargin => write!(f, "minrelmargin"),
            VariableKey::MarginSign => write!(f, "marginsign"),
            VariableKey::LoopFlowViolation { cnec, side } => {
                write!(f, "loopflowviolation_{}_{}", cnec.value(), side)
            }
            VariableKey::MnecViolation { cnec, side } => {
                write!(f, "mnecviolation_{}_{}", cnec.value(), side)
            }
            VariableKey::RangeActionUsed {
                range_action,
                state,
            } => write!(f, "used_{}_{}", range_action.value(), state.value()),
            VariableKey::OperatorUsed { operator, state } => {
                write!(f, "operatorused_{}_{}", operator, state.value())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl VariableId {
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl ConstraintId {
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VariableKind {
    #[default]
    Continuous,
    Integer,
    /// Integer in [0, 1]
    Binary,
}

/// Outcome reported by a back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearProblemStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimeLimit,
    /// Solver failure or unsupported problem (MILP on an LP-only back end)
    Abnormal,
}

impl fmt::Display for LinearProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinearProblemStatus::Optimal => write!(f, "optimal"),
            LinearProblemStatus::Infeasible => write!(f, "infeasible"),
            LinearProblemStatus::Unbounded => write!(f, "unbounded"),
            LinearProblemStatus::TimeLimit => write!(f, "time limit"),
            LinearProblemStatus::Abnormal => write!(f, "abnormal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariableData {
    pub key: VariableKey,
    pub lb: f64,
    pub ub: f64,
    pub kind: VariableKind,
}

#[derive(Debug, Clone)]
pub struct ConstraintData {
    pub key: ConstraintKey,
    pub lb: f64,
    pub ub: f64,
    pub coefficients: BTreeMap<VariableId, f64>,
}

/// Variables, constraints and a minimised objective.
#[derive(Debug, Clone, Default)]
pub struct LinearProblem {
    variables: Vec<VariableData>,
    variable_index: HashMap<VariableKey, VariableId>,
    constraints: Vec<ConstraintData>,
    constraint_index: HashMap<ConstraintKey, ConstraintId>,
    objective: BTreeMap<VariableId, f64>,
    solution: Option<Vec<f64>>,
    status: Option<LinearProblemStatus>,
}

impl LinearProblem {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn infinity() -> f64 {
        f64::INFINITY
    }

    /// Adds a variable. Fails if the key is already taken.
    pub fn add_variable(
        &mut self,
        key: VariableKey,
        lb: f64,
        ub: f64,
        kind: VariableKind,
    ) -> RaoResult<VariableId> {
        if self.variable_index.contains_key(&key) {
            return Err(RaoError::Solver(format!("variable {key} already exists")));
        }
        let id = VariableId(self.variables.len());
        self.variables.push(VariableData { key, lb, ub, kind });
        self.variable_index.insert(key, id);
        Ok(id)
    }

    /// Returns the variable named `key`, creating it with the given bounds
    /// when absent. Bounds of an existing variable are left untouched.
    pub fn variable_or_insert(
        &mut self,
        key: VariableKey,
        lb: f64,
        ub: f64,
        kind: VariableKind,
    ) -> VariableId {
        if let Some(id) = self.variable_index.get(&key) {
            return *id;
        }
        let id = VariableId(self.variables.len());
        self.variables.push(VariableData { key, lb, ub, kind });
        self.variable_index.insert(key, id);
        id
    }

    pub fn variable(&self, key: &VariableKey) -> Option<VariableId> {
        self.variable_index.get(key).copied()
    }

    /// Adds a constraint `lb ≤ Σ coef·x ≤ ub`. Fails if the key is already taken.
    pub fn add_constraint(&mut self, key: ConstraintKey, lb: f64, ub: f64) -> RaoResult<ConstraintId> {
        if self.constraint_index.contains_key(&key) {
            return Err(RaoError::Solver(format!("constraint {key:?} already exists")));
        }
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(ConstraintData {
            key,
            lb,
            ub,
            coefficients: BTreeMap::new(),
        });
        self.constraint_index.insert(key, id);
        Ok(id)
    }

    pub fn constraint(&self, key: &ConstraintKey) -> Option<ConstraintId> {
        self.constraint_index.get(key).copied()
    }

    /// Returns the constraint named `key` with its bounds set to `[lb, ub]`,
    /// creating it when absent. Coefficients of an existing constraint are kept.
    pub fn constraint_or_insert(&mut self, key: ConstraintKey, lb: f64, ub: f64) -> ConstraintId {
        if let Some(id) = self.constraint(&key) {
            self.set_constraint_bounds(id, lb, ub);
            return id;
        }
        let id = ConstraintId(self.constraints.len());
        self.constraints.push(ConstraintData {
            key,
            lb,
            ub,
            coefficients: BTreeMap::new(),
        });
        self.constraint_index.insert(key, id);
        id
    }

    /// Sets (overwrites) a coefficient; a zero value removes the entry.
    pub fn set_coefficient(&mut self, constraint: ConstraintId, variable: VariableId, value: f64) {
        let coefficients = &mut self.constraints[constraint.0].coefficients;
        if value == 0.0 {
            coefficients.remove(&variable);
        } else {
            coefficients.insert(variable, value);
        }
    }

    pub fn coefficient(&self, constraint: ConstraintId, variable: VariableId) -> f64 {
        self.constraints[constraint.0]
            .coefficients
            .get(&variable)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn clear_coefficients(&mut self, constraint: ConstraintId) {
        self.constraints[constraint.0].coefficients.clear();
    }

    pub fn set_objective_coefficient(&mut self, variable: VariableId, value: f64) {
        if value == 0.0 {
            self.objective.remove(&variable);
        } else {
            self.objective.insert(variable, value);
        }
    }

    pub fn objective_coefficient(&self, variable: VariableId) -> f64 {
        self.objective.get(&variable).copied().unwrap_or(0.0)
    }

    pub fn set_variable_bounds(&mut self, variable: VariableId, lb: f64, ub: f64) {
        let data = &mut self.variables[variable.0];
        data.lb = lb;
        data.ub = ub;
    }

    pub fn set_constraint_bounds(&mut self, constraint: ConstraintId, lb: f64, ub: f64) {
        let data = &mut self.constraints[constraint.0];
        data.lb = lb;
        data.ub = ub;
    }

    pub fn variable_bounds(&self, variable: VariableId) -> (f64, f64) {
        let data = &self.variables[variable.0];
        (data.lb, data.ub)
    }

    pub fn constraint_bounds(&self, constraint: ConstraintId) -> (f64, f64) {
        let data = &self.constraints[constraint.0];
        (data.lb, data.ub)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integer_variables(&self) -> bool {
        self.variables
            .iter()
            .any(|v| v.kind != VariableKind::Continuous)
    }

    pub fn variables(&self) -> &[VariableData] {
        &self.variables
    }

    pub fn constraints(&self) -> &[ConstraintData] {
        &self.constraints
    }

    /// Non-zero objective coefficients, in variable order.
    pub fn objective_terms(&self) -> impl Iterator<Item = (VariableId, f64)> + '_ {
        self.objective.iter().map(|(v, c)| (*v, *c))
    }

    /// Solves with `backend`; values are kept only for an optimal status.
    pub fn solve(
        &mut self,
        backend: &dyn LpBackend,
        time_limit: Option<Duration>,
    ) -> RaoResult<LinearProblemStatus> {
        self.solution = None;
        let solution = backend.solve(self, time_limit)?;
        if solution.status == LinearProblemStatus::Optimal {
            if solution.values.len() != self.variables.len() {
                return Err(RaoError::Solver(format!(
                    "back end {} returned {} values for {} variables",
                    backend.id(),
                    solution.values.len(),
                    self.variables.len()
                )));
            }
            self.solution = Some(solution.values);
        }
        self.status = Some(solution.status);
        Ok(solution.status)
    }

    pub fn status(&self) -> Option<LinearProblemStatus> {
        self.status
    }

    /// Solved value of `variable`, if the last solve was optimal.
    pub fn value(&self, variable: VariableId) -> Option<f64> {
        self.solution.as_ref().map(|values| values[variable.0])
    }

    /// Σ coef·x of a constraint at the last solution.
    pub fn activity(&self, constraint: ConstraintId) -> Option<f64> {
        let values = self.solution.as_ref()?;
        Some(
            self.constraints[constraint.0]
                .coefficients
                .iter()
                .map(|(v, c)| c * values[v.0])
                .sum(),
        )
    }
}
