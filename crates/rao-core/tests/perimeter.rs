//! Integration tests for perimeter construction and predecessor queries.

use rao_core::*;
use std::collections::BTreeMap;

fn pst_table() -> BTreeMap<i32, f64> {
    (-5..=5).map(|tap| (tap, f64::from(tap) * 0.5)).collect()
}

/// preventive, then outage / auto / curative1 / curative2 after one contingency.
fn full_timeline() -> (OptimizationPerimeter, Vec<StateId>) {
    let mut builder = PerimeterBuilder::new();
    let preventive = builder.add_state(Instant::preventive(), None);
    let outage = builder.add_state(Instant::outage(), Some("co1"));
    let auto = builder.add_state(Instant::auto(), Some("co1"));
    let cur1 = builder.add_state(Instant::curative(1), Some("co1"));
    let cur2 = builder.add_state(Instant::curative(2), Some("co1"));

    let pst = builder.add_range_action(RangeAction::pst("pst", pst_table(), 0).unwrap());
    let hvdc = builder.add_range_action(RangeAction::hvdc("hvdc", -200.0, 200.0, 10.0));
    builder.make_available(pst, preventive);
    builder.make_available(pst, cur2);
    builder.make_available(hvdc, cur1);

    for state in [preventive, outage, auto, cur1, cur2] {
        builder.add_cnec(
            Cnec::new(format!("line@{}", state.value()), state)
                .with_threshold(Threshold::megawatt(Side::One, Some(-300.0), Some(300.0))),
        );
    }
    builder.add_cnec(
        Cnec::new("mnec", cur2)
            .optimized(false)
            .monitored(true)
            .with_threshold(Threshold::ampere(Side::Two, None, Some(1200.0))),
    );
    builder.add_cnec(Cnec::new("loop", preventive).with_loop_flow_threshold(150.0));

    let perimeter = builder.build().unwrap();
    (perimeter, vec![preventive, outage, auto, cur1, cur2])
}

#[test]
fn predecessor_chain_walks_back_to_preventive() {
    let (perimeter, states) = full_timeline();
    let chain = perimeter.chain(states[4]);
    assert_eq!(chain, vec![states[4], states[3], states[2], states[1], states[0]]);
}

#[test]
fn acting_range_actions_use_latest_available_state() {
    let (perimeter, states) = full_timeline();
    let pst = RangeActionId::new(0);
    let hvdc = RangeActionId::new(1);

    // curative2 cnec: pst acts through its curative2 setpoint, hvdc through curative1
    let cur2_cnec = CnecId::new(4);
    let acting = perimeter.range_actions_acting_on(cur2_cnec, |_, _| true);
    assert!(acting.contains(&(pst, states[4])));
    assert!(acting.contains(&(hvdc, states[3])));
    assert_eq!(acting.len(), 2);

    // outage cnec: only the preventive pst
    assert_eq!(
        perimeter.range_actions_acting_on(CnecId::new(1), |_, _| true),
        vec![(pst, states[0])]
    );
}

#[test]
fn cnec_categories() {
    let (perimeter, _) = full_timeline();
    assert_eq!(perimeter.optimized_cnecs().count(), 6);
    let mnecs: Vec<CnecId> = perimeter.monitored_cnecs().collect();
    assert_eq!(mnecs, vec![CnecId::new(5)]);
    let loop_flow: Vec<CnecId> = perimeter.loop_flow_cnecs().collect();
    assert_eq!(loop_flow, vec![CnecId::new(6)]);
}

#[test]
fn range_action_states_follow_instant_order() {
    let (perimeter, states) = full_timeline();
    let pairs = perimeter.range_action_states();
    let ordered_states: Vec<StateId> = pairs.iter().map(|(_, s)| *s).collect();
    assert_eq!(ordered_states, vec![states[0], states[3], states[4]]);
}

#[test]
fn explicit_predecessor_can_skip_instants() {
    let mut builder = PerimeterBuilder::new();
    let preventive = builder.add_state(Instant::preventive(), None);
    let outage = builder.add_state(Instant::outage(), Some("co1"));
    let curative = builder.add_state(Instant::curative(1), Some("co1"));
    builder.set_predecessor(curative, preventive);
    let perimeter = builder.build().unwrap();
    assert_eq!(perimeter.predecessor(curative), Some(preventive));
    assert_eq!(perimeter.predecessor(outage), Some(preventive));
}

#[test]
fn predecessor_from_another_contingency_is_structural() {
    let mut builder = PerimeterBuilder::new();
    let outage = builder.add_state(Instant::outage(), Some("co1"));
    let curative = builder.add_state(Instant::curative(1), Some("co2"));
    builder.set_predecessor(curative, outage);
    let err = builder.build().unwrap_err();
    assert!(err.is_structural(), "{err}");
}

#[test]
fn empty_perimeter_is_structural() {
    assert!(PerimeterBuilder::new().build().unwrap_err().is_structural());
}
