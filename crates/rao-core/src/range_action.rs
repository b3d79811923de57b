//! Range actions: controls with a continuous or discrete setpoint domain.
//!
//! Three kinds are supported, each carrying its own payload:
//!
//! | Kind | Optimisation unit | Range unit | Domain |
//! |------|-------------------|------------|--------|
//! | [`RangeActionKind::PstTap`] | angle (°) | tap | tap → angle table |
//! | [`RangeActionKind::Hvdc`] | MW | MW | engineering limits |
//! | [`RangeActionKind::Injection`] | MW | MW | engineering limits |
//!
//! The tap → angle table of a phase shifter is not assumed monotonic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RaoError, RaoResult};

/// How a [`Range`] bounds the setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    /// Bounds the setpoint directly.
    Absolute,
    /// Bounds the setpoint around its pre-optimisation value.
    RelativeToInitialNetwork,
    /// Bounds the change with respect to the predecessor state's setpoint.
    RelativeToPreviousInstant,
}

/// One range constraint, expressed in taps for phase shifters and MW otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub range_type: RangeType,
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn absolute(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::Absolute,
            min,
            max,
        }
    }

    pub fn relative_to_initial(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::RelativeToInitialNetwork,
            min,
            max,
        }
    }

    pub fn relative_to_previous(min: f64, max: f64) -> Self {
        Self {
            range_type: RangeType::RelativeToPreviousInstant,
            min,
            max,
        }
    }
}

/// Kind tag, used to look up per-kind parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeActionType {
    Pst,
    Hvdc,
    Injection,
}

impl fmt::Display for RangeActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeActionType::Pst => write!(f, "pst"),
            RangeActionType::Hvdc => write!(f, "hvdc"),
            RangeActionType::Injection => write!(f, "injection"),
        }
    }
}

/// Kind-specific payload of a range action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeActionKind {
    /// Discrete-tap phase shifter.
    PstTap {
        tap_to_angle: BTreeMap<i32, f64>,
        initial_tap: i32,
    },
    /// Continuous HVDC active power setpoint.
    Hvdc { min_setpoint: f64, max_setpoint: f64 },
    /// Continuous generation/load shift distributed with keys.
    Injection {
        min_setpoint: f64,
        max_setpoint: f64,
        distribution_keys: BTreeMap<String, f64>,
    },
}

/// A controllable element with an admissible setpoint domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub name: String,
    pub kind: RangeActionKind,
    pub ranges: Vec<Range>,
    /// Pre-optimisation setpoint in the optimisation unit.
    pub initial_setpoint: f64,
    /// Transmission system operator owning the action.
    #[serde(default)]
    pub operator: Option<String>,
}

impl RangeAction {
    /// Phase shifter; the initial setpoint is the angle of `initial_tap`.
    pub fn pst(
        name: impl Into<String>,
        tap_to_angle: BTreeMap<i32, f64>,
        initial_tap: i32,
    ) -> RaoResult<Self> {
        let name = name.into();
        if tap_to_angle.is_empty() {
            return Err(RaoError::Validation(format!(
                "PST {name} has an empty tap table"
            )));
        }
        if let Some((tap, _)) = tap_to_angle.iter().find(|(_, a)| !a.is_finite()) {
            return Err(RaoError::Validation(format!(
                "PST {name} has a non-finite angle at tap {tap}"
            )));
        }
        let initial_setpoint = *tap_to_angle.get(&initial_tap).ok_or_else(|| {
            RaoError::Validation(format!(
                "PST {name} initial tap {initial_tap} is not in its tap table"
            ))
        })?;
        Ok(Self {
            name,
            kind: RangeActionKind::PstTap {
                tap_to_angle,
                initial_tap,
            },
            ranges: Vec::new(),
            initial_setpoint,
            operator: None,
        })
    }

    pub fn hvdc(
        name: impl Into<String>,
        min_setpoint: f64,
        max_setpoint: f64,
        initial_setpoint: f64,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RangeActionKind::Hvdc {
                min_setpoint,
                max_setpoint,
            },
            ranges: Vec::new(),
            initial_setpoint,
            operator: None,
        }
    }

    pub fn injection(
        name: impl Into<String>,
        min_setpoint: f64,
        max_setpoint: f64,
        initial_setpoint: f64,
        distribution_keys: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RangeActionKind::Injection {
                min_setpoint,
                max_setpoint,
                distribution_keys,
            },
            ranges: Vec::new(),
            initial_setpoint,
            operator: None,
        }
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn action_type(&self) -> RangeActionType {
        match self.kind {
            RangeActionKind::PstTap { .. } => RangeActionType::Pst,
            RangeActionKind::Hvdc { .. } => RangeActionType::Hvdc,
            RangeActionKind::Injection { .. } => RangeActionType::Injection,
        }
    }

    pub fn is_pst(&self) -> bool {
        matches!(self.kind, RangeActionKind::PstTap { .. })
    }

    pub fn ranges_of(&self, range_type: RangeType) -> impl Iterator<Item = &Range> {
        self.ranges
            .iter()
            .filter(move |r| r.range_type == range_type)
    }

    /// Physical domain in range units (taps or MW).
    pub fn physical_domain(&self) -> (f64, f64) {
        match &self.kind {
            RangeActionKind::PstTap { tap_to_angle, .. } => {
                let min = tap_to_angle.keys().next().copied().unwrap_or(0);
                let max = tap_to_angle.keys().next_back().copied().unwrap_or(0);
                (f64::from(min), f64::from(max))
            }
            RangeActionKind::Hvdc {
                min_setpoint,
                max_setpoint,
            }
            | RangeActionKind::Injection {
                min_setpoint,
                max_setpoint,
                ..
            } => (*min_setpoint, *max_setpoint),
        }
    }

    /// Pre-optimisation value in range units (tap for phase shifters).
    pub fn initial_range_value(&self) -> f64 {
        match &self.kind {
            RangeActionKind::PstTap { initial_tap, .. } => f64::from(*initial_tap),
            _ => self.initial_setpoint,
        }
    }

    pub fn tap_to_angle(&self, tap: i32) -> Option<f64> {
        match &self.kind {
            RangeActionKind::PstTap { tap_to_angle, .. } => tap_to_angle.get(&tap).copied(),
            _ => None,
        }
    }

    /// Closest tap to `angle`; ties go to the lowest tap.
    pub fn angle_to_tap(&self, angle: f64) -> Option<i32> {
        match &self.kind {
            RangeActionKind::PstTap { tap_to_angle, .. } => tap_to_angle
                .iter()
                .min_by(|(_, a), (_, b)| (*a - angle).abs().total_cmp(&(*b - angle).abs()))
                .map(|(tap, _)| *tap),
            _ => None,
        }
    }

    /// Smallest angle difference between consecutive taps.
    pub fn smallest_angle_step(&self) -> Option<f64> {
        match &self.kind {
            RangeActionKind::PstTap { tap_to_angle, .. } => {
                let angles: Vec<f64> = tap_to_angle.values().copied().collect();
                angles
                    .windows(2)
                    .map(|w| (w[1] - w[0]).abs())
                    .filter(|step| *step > 1e-9)
                    .min_by(f64::total_cmp)
            }
            _ => None,
        }
    }

    /// Sum of the injection distribution keys (0 for other kinds).
    pub fn total_distribution_key(&self) -> f64 {
        match &self.kind {
            RangeActionKind::Injection {
                distribution_keys, ..
            } => distribution_keys.values().sum(),
            _ => 0.0,
        }
    }
}
