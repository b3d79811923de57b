//! Critical network elements and contingencies (cnecs).
//!
//! A cnec is a branch monitored in one grid state. Each monitored side has
//! optional lower/upper flow thresholds, given in MW or A. Flows inside the
//! optimiser are always expressed in MW; ampere thresholds are converted
//! with the side's nominal voltage when bounds are read.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::{megawatts_per_ampere, Amperes, Kilovolts, Megawatts};
use crate::StateId;

/// Terminal of a monitored branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::One => write!(f, "side1"),
            Side::Two => write!(f, "side2"),
        }
    }
}

/// Unit of a flow quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowUnit {
    #[default]
    Megawatt,
    Ampere,
}

/// Direction of a flow bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoundDirection {
    /// Flow must stay above the lower threshold
    Lower,
    /// Flow must stay below the upper threshold
    Upper,
}

/// Flow limits on one side of a cnec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub side: Side,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default)]
    pub unit: FlowUnit,
}

impl Threshold {
    pub fn megawatt(side: Side, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            side,
            min,
            max,
            unit: FlowUnit::Megawatt,
        }
    }

    pub fn ampere(side: Side, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            side,
            min,
            max,
            unit: FlowUnit::Ampere,
        }
    }
}

/// A monitored branch side in a given state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cnec {
    pub name: String,
    pub state: StateId,
    pub thresholds: Vec<Threshold>,
    /// Nominal voltage per side ([side one, side two]), used for A ↔ MW.
    pub nominal_voltage_kv: [f64; 2],
    /// Counts in the margin objective.
    pub optimized: bool,
    /// Margin must not degrade beyond an accepted decrease (MNEC).
    pub monitored: bool,
    /// Loop-flow limit in MW, when the branch is a loop-flow cnec.
    pub loop_flow_threshold_mw: Option<f64>,
}

impl Cnec {
    /// An optimized cnec without thresholds, 400 kV on both sides.
    pub fn new(name: impl Into<String>, state: StateId) -> Self {
        Self {
            name: name.into(),
            state,
            thresholds: Vec::new(),
            nominal_voltage_kv: [400.0, 400.0],
            optimized: true,
            monitored: false,
            loop_flow_threshold_mw: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn with_nominal_voltage(mut self, side_one_kv: f64, side_two_kv: f64) -> Self {
        self.nominal_voltage_kv = [side_one_kv, side_two_kv];
        self
    }

    pub fn optimized(mut self, optimized: bool) -> Self {
        self.optimized = optimized;
        self
    }

    pub fn monitored(mut self, monitored: bool) -> Self {
        self.monitored = monitored;
        self
    }

    pub fn with_loop_flow_threshold(mut self, threshold_mw: f64) -> Self {
        self.loop_flow_threshold_mw = Some(threshold_mw);
        self
    }

    /// Sides carrying at least one threshold, in side order.
    pub fn monitored_sides(&self) -> Vec<Side> {
        let mut sides: Vec<Side> = self.thresholds.iter().map(|t| t.side).collect();
        sides.sort();
        sides.dedup();
        sides
    }

    pub fn nominal_voltage(&self, side: Side) -> Kilovolts {
        match side {
            Side::One => Kilovolts(self.nominal_voltage_kv[0]),
            Side::Two => Kilovolts(self.nominal_voltage_kv[1]),
        }
    }

    /// Factor turning a MW value on `side` into `unit`.
    pub fn unit_factor(&self, side: Side, unit: FlowUnit) -> f64 {
        match unit {
            FlowUnit::Megawatt => 1.0,
            FlowUnit::Ampere => {
                let mw_per_a = megawatts_per_ampere(self.nominal_voltage(side));
                if mw_per_a.abs() < 1e-12 {
                    1.0
                } else {
                    1.0 / mw_per_a
                }
            }
        }
    }

    /// MW corresponding to one `unit` on `side`.
    pub fn megawatts_per_unit(&self, side: Side, unit: FlowUnit) -> f64 {
        match unit {
            FlowUnit::Megawatt => 1.0,
            FlowUnit::Ampere => megawatts_per_ampere(self.nominal_voltage(side)),
        }
    }

    /// Tightest (lower, upper) bounds on `side`, in MW.
    pub fn bounds_mw(&self, side: Side) -> (Option<f64>, Option<f64>) {
        let mut lower: Option<f64> = None;
        let mut upper: Option<f64> = None;
        for threshold in self.thresholds.iter().filter(|t| t.side == side) {
            if let Some(min) = threshold.min {
                let min_mw = self.threshold_mw(side, threshold.unit, min).value();
                lower = Some(lower.map_or(min_mw, |l| l.max(min_mw)));
            }
            if let Some(max) = threshold.max {
                let max_mw = self.threshold_mw(side, threshold.unit, max).value();
                upper = Some(upper.map_or(max_mw, |u| u.min(max_mw)));
            }
        }
        (lower, upper)
    }

    fn threshold_mw(&self, side: Side, unit: FlowUnit, value: f64) -> Megawatts {
        match unit {
            FlowUnit::Megawatt => Megawatts(value),
            FlowUnit::Ampere => Amperes(value).to_megawatts(self.nominal_voltage(side)),
        }
    }

    /// Margin (MW) of `flow_mw` against the bounds of `side`; `None` when
    /// the side is unconstrained.
    pub fn margin_mw(&self, side: Side, flow_mw: f64) -> Option<f64> {
        let (lower, upper) = self.bounds_mw(side);
        let lower_margin = lower.map(|l| flow_mw - l);
        let upper_margin = upper.map(|u| u - flow_mw);
        match (lower_margin, upper_margin) {
            (Some(l), Some(u)) => Some(l.min(u)),
            (Some(l), None) => Some(l),
            (None, Some(u)) => Some(u),
            (None, None) => None,
        }
    }

    /// Upper threshold magnitude, used to size big-M constants.
    pub fn highest_threshold_mw(&self) -> f64 {
        self.monitored_sides()
            .into_iter()
            .map(|side| {
                let (l, u) = self.bounds_mw(side);
                l.map_or(0.0, f64::abs).max(u.map_or(0.0, f64::abs))
            })
            .fold(0.0, f64::max)
    }
}
