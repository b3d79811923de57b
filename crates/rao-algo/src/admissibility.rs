//! Range action admissibility.
//!
//! For a (range action, state) pair the admissible interval is the
//! intersection of:
//!
//! 1. the physical domain (tap range or engineering limits),
//! 2. absolute ranges,
//! 3. relative-to-initial ranges around the pre-optimisation value,
//! 4. relative-to-previous-instant ranges around the interval resolved at the
//!    previous state where the action is available.
//!
//! Intersections are computed in range units (taps for phase shifters, MW
//! otherwise). Phase shifter intervals are then turned into angle bounds by
//! taking the min/max angle over the admissible taps, since tap → angle
//! tables need not be monotonic.
//!
//! Empty or inverted intersections are reported as [`RangeInfeasibility`],
//! never clamped. The previous-state walk is iterative over the perimeter's
//! predecessor chain.

use rao_core::{OptimizationPerimeter, RangeAction, RangeActionId, RangeActionKind, RangeType, StateId};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

const TAP_EPSILON: f64 = 1e-9;

/// Admissible setpoint interval of one (range action, state) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissibleRange {
    /// Lowest admissible setpoint, optimisation unit
    pub min: f64,
    /// Highest admissible setpoint, optimisation unit
    pub max: f64,
    /// Bounds on `setpoint − previous setpoint` (optimisation unit), when the
    /// action has relative-to-previous-instant ranges and a previous state.
    pub relative: Option<(f64, f64)>,
    /// Previous state of the perimeter where the action is optimised.
    pub previous: Option<StateId>,
    /// Lowest and highest admissible tap (phase shifters only).
    pub taps: Option<(i32, i32)>,
}

impl AdmissibleRange {
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A (range action, state) pair whose ranges do not intersect.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("range action {name} has an empty admissible range at state {state_label}: [{min}, {max}]")]
pub struct RangeInfeasibility {
    pub range_action: RangeActionId,
    pub state: StateId,
    pub name: String,
    pub state_label: String,
    /// Lower end of the empty intersection, range unit
    pub min: f64,
    /// Upper end of the empty intersection, range unit
    pub max: f64,
}

/// Interval in range units, before conversion.
#[derive(Debug, Clone, Copy)]
struct RangeInterval {
    min: f64,
    max: f64,
    relative: Option<(f64, f64)>,
}

pub struct AdmissibilityResolver<'a> {
    perimeter: &'a OptimizationPerimeter,
}

impl<'a> AdmissibilityResolver<'a> {
    pub fn new(perimeter: &'a OptimizationPerimeter) -> Self {
        Self { perimeter }
    }

    /// Resolve the admissible interval of `range_action` at `state`.
    pub fn resolve(
        &self,
        range_action: RangeActionId,
        state: StateId,
    ) -> Result<AdmissibleRange, RangeInfeasibility> {
        let action = self.perimeter.range_action(range_action);

        // earlier states of the chain where the action is optimised, earliest first
        let mut earlier: Vec<StateId> = self
            .perimeter
            .chain(state)
            .into_iter()
            .skip(1)
            .filter(|&s| self.perimeter.is_available(range_action, s))
            .collect();
        earlier.reverse();

        let mut previous: Option<(StateId, RangeInterval)> = None;
        for current in earlier {
            let interval = intersect(action, previous.map(|(_, p)| p));
            // an infeasible earlier state is excluded, so it is not "previous"
            if interval_is_feasible(action, &interval) {
                previous = Some((current, interval));
            }
        }

        let interval = intersect(action, previous.map(|(_, p)| p));
        if interval_is_feasible(action, &interval) {
            Ok(to_admissible(action, interval, previous.map(|(s, _)| s)))
        } else {
            Err(RangeInfeasibility {
                range_action,
                state,
                name: action.name.clone(),
                state_label: self.perimeter.state(state).label(),
                min: interval.min,
                max: interval.max,
            })
        }
    }

    /// Resolve every (range action, state) pair of the perimeter.
    pub fn resolve_all(&self) -> AdmissibleRanges {
        let mut ranges = AdmissibleRanges::default();
        for (ra, state) in self.perimeter.range_action_states() {
            match self.resolve(ra, state) {
                Ok(range) => {
                    ranges.ranges.insert((ra, state), range);
                }
                Err(infeasibility) => {
                    warn!(%infeasibility, "range action excluded from optimisation");
                    ranges.infeasible.push(infeasibility);
                }
            }
        }
        ranges
    }
}

fn intersect(action: &RangeAction, previous: Option<RangeInterval>) -> RangeInterval {
    let (mut min, mut max) = action.physical_domain();
    let mut relative: Option<(f64, f64)> = None;
    let mut invalid = false;

    for range in &action.ranges {
        if range.min.is_nan() || range.max.is_nan() {
            invalid = true;
            continue;
        }
        match range.range_type {
            RangeType::Absolute => {
                min = min.max(range.min);
                max = max.min(range.max);
            }
            RangeType::RelativeToInitialNetwork => {
                let p = action.initial_range_value();
                min = min.max(p + range.min);
                max = max.min(p + range.max);
            }
            RangeType::RelativeToPreviousInstant => {
                // vacuous without a previous state
                if let Some(prev) = previous {
                    min = min.max(prev.min + range.min);
                    max = max.min(prev.max + range.max);
                    relative = Some(match relative {
                        Some((lo, hi)) => (lo.max(range.min), hi.min(range.max)),
                        None => (range.min, range.max),
                    });
                }
            }
        }
    }
    if invalid {
        min = f64::NAN;
    }
    RangeInterval { min, max, relative }
}

fn admissible_taps(tap_to_angle: &BTreeMap<i32, f64>, interval: &RangeInterval) -> Vec<(i32, f64)> {
    tap_to_angle
        .iter()
        .filter(|(tap, _)| {
            let tap = f64::from(**tap);
            tap >= interval.min - TAP_EPSILON && tap <= interval.max + TAP_EPSILON
        })
        .map(|(tap, angle)| (*tap, *angle))
        .collect()
}

fn interval_is_feasible(action: &RangeAction, interval: &RangeInterval) -> bool {
    // written so that NaN bounds are infeasible
    if !(interval.min <= interval.max) {
        return false;
    }
    if let Some((lo, hi)) = interval.relative {
        if !(lo <= hi) {
            return false;
        }
    }
    match &action.kind {
        RangeActionKind::PstTap { tap_to_angle, .. } => {
            !admissible_taps(tap_to_angle, interval).is_empty()
        }
        _ => true,
    }
}

fn to_admissible(
    action: &RangeAction,
    interval: RangeInterval,
    previous: Option<StateId>,
) -> AdmissibleRange {
    match &action.kind {
        RangeActionKind::PstTap { tap_to_angle, .. } => {
            let taps = admissible_taps(tap_to_angle, &interval);
            let min_angle = taps.iter().map(|(_, a)| *a).fold(f64::INFINITY, f64::min);
            let max_angle = taps.iter().map(|(_, a)| *a).fold(f64::NEG_INFINITY, f64::max);
            let min_tap = taps.iter().map(|(t, _)| *t).min();
            let max_tap = taps.iter().map(|(t, _)| *t).max();
            let step = action.smallest_angle_step().unwrap_or(0.0);
            AdmissibleRange {
                min: min_angle,
                max: max_angle,
                relative: interval.relative.map(|(lo, hi)| (lo * step, hi * step)),
                previous,
                taps: min_tap.zip(max_tap),
            }
        }
        _ => AdmissibleRange {
            min: interval.min,
            max: interval.max,
            relative: interval.relative,
            previous,
            taps: None,
        },
    }
}

/// Resolved ranges of a whole perimeter, plus the excluded pairs.
#[derive(Debug, Clone, Default)]
pub struct AdmissibleRanges {
    ranges: BTreeMap<(RangeActionId, StateId), AdmissibleRange>,
    infeasible: Vec<RangeInfeasibility>,
}

impl AdmissibleRanges {
    pub fn get(&self, range_action: RangeActionId, state: StateId) -> Option<&AdmissibleRange> {
        self.ranges.get(&(range_action, state))
    }

    pub fn contains(&self, range_action: RangeActionId, state: StateId) -> bool {
        self.ranges.contains_key(&(range_action, state))
    }

    /// Optimised pairs, sorted by (range action, state) id.
    pub fn iter(&self) -> impl Iterator<Item = (RangeActionId, StateId, &AdmissibleRange)> {
        self.ranges.iter().map(|((ra, s), r)| (*ra, *s, r))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn infeasible(&self) -> &[RangeInfeasibility] {
        &self.infeasible
    }
}
