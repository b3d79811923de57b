//! Admissible range resolution across range kinds and states.

use proptest::prelude::*;
use rao_algo::*;
use rao_core::*;
use std::collections::BTreeMap;

fn single_state(action: RangeAction) -> (OptimizationPerimeter, RangeActionId, StateId) {
    let mut builder = PerimeterBuilder::new();
    let state = builder.add_state(Instant::preventive(), None);
    let ra = builder.add_range_action(action);
    builder.make_available(ra, state);
    (builder.build().unwrap(), ra, state)
}

proptest! {
    #[test]
    fn absolute_and_relative_to_initial_intersect(
        a in -200.0f64..200.0,
        b in -200.0f64..200.0,
        c in -100.0f64..100.0,
        d in -100.0f64..100.0,
        p in -100.0f64..100.0,
    ) {
        let action = RangeAction::hvdc("hvdc", -1e6, 1e6, p)
            .with_range(Range::absolute(a, b))
            .with_range(Range::relative_to_initial(c, d));
        let (perimeter, ra, state) = single_state(action);
        let resolved = AdmissibilityResolver::new(&perimeter).resolve(ra, state);

        let lo = a.max(p + c);
        let hi = b.min(p + d);
        if lo <= hi {
            let range = resolved.unwrap();
            prop_assert_eq!(range.min, lo);
            prop_assert_eq!(range.max, hi);
        } else {
            let infeasibility = resolved.unwrap_err();
            prop_assert_eq!(infeasibility.range_action, ra);
            prop_assert_eq!(infeasibility.state, state);
        }
    }

    #[test]
    fn pst_bounds_cover_admissible_taps(
        angles in proptest::collection::vec(-30.0f64..30.0, 3..12),
        low in -6i32..6,
        width in 0i32..6,
    ) {
        let table: BTreeMap<i32, f64> = angles
            .iter()
            .enumerate()
            .map(|(i, angle)| (i as i32 - 3, *angle))
            .collect();
        let min_tap = table.keys().next().copied().unwrap();
        let action = RangeAction::pst("pst", table.clone(), min_tap)
            .unwrap()
            .with_range(Range::absolute(f64::from(low), f64::from(low + width)));
        let (perimeter, ra, state) = single_state(action);
        let resolved = AdmissibilityResolver::new(&perimeter).resolve(ra, state);

        let admissible: Vec<f64> = table
            .iter()
            .filter(|(tap, _)| **tap >= low && **tap <= low + width)
            .map(|(_, angle)| *angle)
            .collect();
        if admissible.is_empty() {
            prop_assert!(resolved.is_err());
        } else {
            let range = resolved.unwrap();
            let expected_min = admissible.iter().copied().fold(f64::INFINITY, f64::min);
            let expected_max = admissible.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(range.min, expected_min);
            prop_assert_eq!(range.max, expected_max);
        }
    }
}

#[test]
fn test_non_monotonic_tap_table_relative_to_initial() {
    let table: BTreeMap<i32, f64> = [(-2, 3.0), (-1, -1.0), (0, 0.0), (1, 6.0), (2, -5.0)]
        .into_iter()
        .collect();
    let action = RangeAction::pst("pst", table, 0)
        .unwrap()
        .with_range(Range::relative_to_initial(-1.0, 1.0));
    let (perimeter, ra, state) = single_state(action);
    let range = AdmissibilityResolver::new(&perimeter)
        .resolve(ra, state)
        .unwrap();
    // taps −1..=1 reach angles −1, 0 and 6
    assert_eq!((range.min, range.max), (-1.0, 6.0));
    assert_eq!(range.taps, Some((-1, 1)));
}

#[test]
fn test_relative_to_previous_chains_over_states() {
    let mut builder = PerimeterBuilder::new();
    let preventive = builder.add_state(Instant::preventive(), None);
    let auto = builder.add_state(Instant::auto(), Some("co1"));
    let curative = builder.add_state(Instant::curative(1), Some("co1"));
    let ra = builder.add_range_action(
        RangeAction::hvdc("hvdc", -1000.0, 1000.0, 0.0)
            .with_range(Range::absolute(-100.0, 100.0))
            .with_range(Range::relative_to_previous(-20.0, 20.0)),
    );
    builder.make_available(ra, preventive);
    builder.make_available(ra, auto);
    builder.make_available(ra, curative);
    let perimeter = builder.build().unwrap();

    let ranges = AdmissibilityResolver::new(&perimeter).resolve_all();
    assert_eq!(ranges.len(), 3);
    let preventive_range = ranges.get(ra, preventive).unwrap();
    assert_eq!(preventive_range.previous, None);
    assert_eq!(preventive_range.relative, None);
    let curative_range = ranges.get(ra, curative).unwrap();
    assert_eq!(curative_range.previous, Some(auto));
    assert_eq!(curative_range.relative, Some((-20.0, 20.0)));
    assert_eq!((curative_range.min, curative_range.max), (-100.0, 100.0));
}
