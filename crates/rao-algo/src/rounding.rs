//! Rounding of solver setpoints before re-evaluation.
//!
//! Phase shifter angles snap to the angle of the closest admissible tap.
//! HVDC and injection setpoints are clamped to their admissible range and,
//! optionally, rounded to an integer MW value inside it.

use rao_core::{RangeAction, RangeActionKind};

use crate::admissibility::AdmissibleRange;

pub fn round_setpoint(
    action: &RangeAction,
    range: &AdmissibleRange,
    value: f64,
    round_continuous: bool,
) -> f64 {
    match &action.kind {
        RangeActionKind::PstTap { tap_to_angle, .. } => {
            let (min_tap, max_tap) = range.taps.unwrap_or((i32::MIN, i32::MAX));
            tap_to_angle
                .range(min_tap..=max_tap)
                .map(|(_, angle)| *angle)
                // ties go to the lowest tap
                .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
                .unwrap_or_else(|| value.clamp(range.min, range.max))
        }
        RangeActionKind::Hvdc { .. } | RangeActionKind::Injection { .. } => {
            let clamped = value.clamp(range.min, range.max);
            if !round_continuous {
                return clamped;
            }
            let rounded = clamped.round();
            if range.contains(rounded) {
                rounded
            } else if range.contains(clamped.floor()) {
                clamped.floor()
            } else if range.contains(clamped.ceil()) {
                clamped.ceil()
            } else {
                clamped
            }
        }
    }
}
