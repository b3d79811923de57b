//! Optimiser parameters.
//!
//! [`LinearOptimizerParameters`] is deserialised from TOML. Every section is
//! optional; unspecified values use the defaults below.
//!
//! ```toml
//! max_iterations = 5
//! objective = "max_min_relative_margin"
//! ra_range_shrinking = true
//!
//! [pst]
//! penalty_cost = 0.02
//!
//! [relative_margin]
//! ptdf_sum_lower_bound = 0.05
//!
//! [ra_usage_limits.curative1]
//! max_ra = 2
//! max_ra_per_tso = { FR = 1 }
//! ```

use rao_core::{FlowUnit, RaoError, RaoResult, RangeActionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::linear_problem::LpSolverKind;

/// Geometric factor applied to the admissible width at each shrinking step.
pub const DEFAULT_RANGE_SHRINK_RATE: f64 = 0.667;

/// Which margin the optimiser maximises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    #[default]
    MaxMinMargin,
    /// Requires a back end with integer support
    MaxMinRelativeMargin,
}

/// Per-kind range action parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeActionKindParameters {
    /// Sensitivities whose magnitude is below this value are dropped.
    pub sensitivity_threshold: f64,
    /// Objective cost per unit of setpoint variation.
    pub penalty_cost: f64,
}

impl RangeActionKindParameters {
    fn with_penalty(penalty_cost: f64) -> Self {
        Self {
            sensitivity_threshold: 0.0,
            penalty_cost,
        }
    }
}

impl Default for RangeActionKindParameters {
    fn default() -> Self {
        Self::with_penalty(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeMarginParameters {
    /// Floor applied to PTDF sums before dividing margins.
    pub ptdf_sum_lower_bound: f64,
    /// Read PTDF sums from every new linearization instead of the initial one.
    pub update_ptdf_sums_each_iteration: bool,
}

impl Default for RelativeMarginParameters {
    fn default() -> Self {
        Self {
            ptdf_sum_lower_bound: 0.01,
            update_ptdf_sums_each_iteration: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopFlowParameters {
    pub enabled: bool,
    /// Loop flow increase (MW) tolerated above the initial loop flow.
    pub acceptable_increase: f64,
    /// Objective cost per MW of loop-flow violation.
    pub violation_cost: f64,
    /// Tightening (MW) of the loop-flow bound inside the linear problem.
    pub constraint_adjustment_coefficient: f64,
    /// Read commercial flows from every new linearization.
    pub update_commercial_flows_each_iteration: bool,
}

impl Default for LoopFlowParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            acceptable_increase: 0.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
            update_commercial_flows_each_iteration: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MnecParameters {
    pub enabled: bool,
    /// Margin decrease (MW) tolerated on monitored-only cnecs.
    pub acceptable_margin_decrease: f64,
    /// Objective cost per MW of violation.
    pub violation_cost: f64,
    /// Tightening (MW) of the MNEC bound inside the linear problem.
    pub constraint_adjustment_coefficient: f64,
}

impl Default for MnecParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            acceptable_margin_decrease: 50.0,
            violation_cost: 10.0,
            constraint_adjustment_coefficient: 0.0,
        }
    }
}

/// Caps on the number of range actions moved at one instant.
///
/// At a curative instant the counts include the actions already moved at
/// earlier curative instants of the same contingency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaUsageLimits {
    pub max_ra: Option<u32>,
    /// Most operators moving at least one action.
    pub max_tso: Option<u32>,
    /// Operators not counted by `max_tso`.
    pub max_tso_exclusion: Vec<String>,
    pub max_ra_per_tso: BTreeMap<String, u32>,
}

impl RaUsageLimits {
    pub fn is_limiting(&self) -> bool {
        self.max_ra.is_some() || self.max_tso.is_some() || !self.max_ra_per_tso.is_empty()
    }
}

/// Parameters of the iterating linear optimiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearOptimizerParameters {
    /// Maximum number of solve / re-evaluate cycles.
    pub max_iterations: u32,
    /// Minimum decrease of the true cost for an iteration to count as progress.
    pub objective_tolerance: f64,
    pub objective: ObjectiveKind,
    /// Unit of margins in the objective.
    pub objective_unit: FlowUnit,
    /// Shrink admissible ranges around the working point between iterations.
    pub ra_range_shrinking: bool,
    pub range_shrink_rate: f64,
    /// Round HVDC and injection setpoints to integer MW.
    pub round_continuous_setpoints: bool,
    pub solver: LpSolverKind,
    /// Per-solve time limit, seconds.
    pub solver_time_limit_secs: Option<f64>,
    pub pst: RangeActionKindParameters,
    pub hvdc: RangeActionKindParameters,
    pub injection: RangeActionKindParameters,
    pub relative_margin: RelativeMarginParameters,
    pub loop_flow: LoopFlowParameters,
    pub mnec: MnecParameters,
    /// Usage limits keyed by instant id.
    pub ra_usage_limits: BTreeMap<String, RaUsageLimits>,
}

impl Default for LinearOptimizerParameters {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            objective_tolerance: 1e-6,
            objective: ObjectiveKind::MaxMinMargin,
            objective_unit: FlowUnit::Megawatt,
            ra_range_shrinking: false,
            range_shrink_rate: DEFAULT_RANGE_SHRINK_RATE,
            round_continuous_setpoints: false,
            solver: LpSolverKind::default(),
            solver_time_limit_secs: None,
            pst: RangeActionKindParameters::with_penalty(0.01),
            hvdc: RangeActionKindParameters::with_penalty(0.001),
            injection: RangeActionKindParameters::with_penalty(0.001),
            relative_margin: RelativeMarginParameters::default(),
            loop_flow: LoopFlowParameters::default(),
            mnec: MnecParameters::default(),
            ra_usage_limits: BTreeMap::new(),
        }
    }
}

impl LinearOptimizerParameters {
    /// Parse parameters from a TOML document.
    pub fn from_toml_str(contents: &str) -> RaoResult<Self> {
        let parameters: Self = toml::from_str(contents)?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Load parameters from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> RaoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> RaoResult<String> {
        toml::to_string_pretty(self).map_err(|e| RaoError::Config(e.to_string()))
    }

    /// Parameters of one range action kind.
    pub fn range_action(&self, kind: RangeActionType) -> &RangeActionKindParameters {
        match kind {
            RangeActionType::Pst => &self.pst,
            RangeActionType::Hvdc => &self.hvdc,
            RangeActionType::Injection => &self.injection,
        }
    }

    /// Limits applying at `instant`, if any of them restricts something.
    pub fn usage_limits(&self, instant: &str) -> Option<&RaUsageLimits> {
        self.ra_usage_limits
            .get(instant)
            .filter(|limits| limits.is_limiting())
    }

    pub fn has_usage_limits(&self) -> bool {
        self.ra_usage_limits.values().any(RaUsageLimits::is_limiting)
    }

    /// The relative objective and usage limits both add binary variables.
    pub fn needs_integer_variables(&self) -> bool {
        self.objective == ObjectiveKind::MaxMinRelativeMargin || self.has_usage_limits()
    }

    pub fn solver_time_limit(&self) -> Option<Duration> {
        self.solver_time_limit_secs.map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> RaoResult<()> {
        if self.max_iterations == 0 {
            return Err(RaoError::Config("max_iterations must be at least 1".into()));
        }
        check_non_negative("objective_tolerance", self.objective_tolerance)?;
        if !(self.range_shrink_rate > 0.0 && self.range_shrink_rate < 1.0) {
            return Err(RaoError::Config(format!(
                "range_shrink_rate must be in (0, 1), got {}",
                self.range_shrink_rate
            )));
        }
        for (kind, p) in [("pst", &self.pst), ("hvdc", &self.hvdc), ("injection", &self.injection)] {
            check_non_negative(&format!("{kind}.sensitivity_threshold"), p.sensitivity_threshold)?;
            check_non_negative(&format!("{kind}.penalty_cost"), p.penalty_cost)?;
        }
        let lb = self.relative_margin.ptdf_sum_lower_bound;
        if !(lb.is_finite() && lb > 0.0) {
            return Err(RaoError::Config(format!(
                "relative_margin.ptdf_sum_lower_bound must be positive, got {lb}"
            )));
        }
        check_non_negative("loop_flow.acceptable_increase", self.loop_flow.acceptable_increase)?;
        check_non_negative("loop_flow.violation_cost", self.loop_flow.violation_cost)?;
        check_non_negative(
            "loop_flow.constraint_adjustment_coefficient",
            self.loop_flow.constraint_adjustment_coefficient,
        )?;
        check_non_negative(
            "mnec.acceptable_margin_decrease",
            self.mnec.acceptable_margin_decrease,
        )?;
        check_non_negative("mnec.violation_cost", self.mnec.violation_cost)?;
        check_non_negative(
            "mnec.constraint_adjustment_coefficient",
            self.mnec.constraint_adjustment_coefficient,
        )?;
        for (instant, limits) in &self.ra_usage_limits {
            if limits.max_ra_per_tso.keys().any(String::is_empty) {
                return Err(RaoError::Config(format!(
                    "ra_usage_limits.{instant}.max_ra_per_tso has an empty operator name"
                )));
            }
        }
        if let Some(limit) = self.solver_time_limit_secs {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(RaoError::Config(format!(
                    "solver_time_limit_secs must be positive, got {limit}"
                )));
            }
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, value: f64) -> RaoResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RaoError::Config(format!(
            "{name} must be a non-negative number, got {value}"
        )))
    }
}
