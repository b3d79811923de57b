//! Setpoint assignment: (range action, state) → setpoint arena.
//!
//! One dense table per run, indexed by stable ids. A range action without an
//! explicit value at a state inherits the value of its last activated
//! predecessor state, or its pre-optimisation setpoint.

use rao_core::{OptimizationPerimeter, RangeActionId, StateId};

#[derive(Debug, Clone, PartialEq)]
pub struct SetpointAssignment {
    initial: Vec<f64>,
    predecessors: Vec<Option<StateId>>,
    /// Row-major: range action × state
    values: Vec<Option<f64>>,
    n_states: usize,
}

impl SetpointAssignment {
    /// Assignment holding only the pre-optimisation setpoints.
    pub fn new(perimeter: &OptimizationPerimeter) -> Self {
        let n_states = perimeter.states().len();
        let mut predecessors = vec![None; n_states];
        for &state in perimeter.states() {
            predecessors[state.value()] = perimeter.predecessor(state);
        }
        let initial: Vec<f64> = perimeter
            .range_action_ids()
            .map(|ra| perimeter.range_action(ra).initial_setpoint)
            .collect();
        Self {
            values: vec![None; initial.len() * n_states],
            initial,
            predecessors,
            n_states,
        }
    }

    #[inline]
    fn slot(&self, range_action: RangeActionId, state: StateId) -> usize {
        range_action.value() * self.n_states + state.value()
    }

    pub fn set(&mut self, range_action: RangeActionId, state: StateId, value: f64) {
        let slot = self.slot(range_action, state);
        self.values[slot] = Some(value);
    }

    /// Explicit value at `state`, without inheritance.
    pub fn explicit(&self, range_action: RangeActionId, state: StateId) -> Option<f64> {
        self.values[self.slot(range_action, state)]
    }

    pub fn initial(&self, range_action: RangeActionId) -> f64 {
        self.initial[range_action.value()]
    }

    /// Value at `state`, inherited along the predecessor chain.
    pub fn setpoint(&self, range_action: RangeActionId, state: StateId) -> f64 {
        let mut current = Some(state);
        let mut steps = 0;
        while let Some(s) = current {
            if let Some(value) = self.explicit(range_action, s) {
                return value;
            }
            steps += 1;
            if steps > self.n_states {
                break;
            }
            current = self.predecessors[s.value()];
        }
        self.initial(range_action)
    }

    /// Value in force just before `state`: at its predecessor, or initial.
    pub fn previous_setpoint(&self, range_action: RangeActionId, state: StateId) -> f64 {
        match self.predecessors[state.value()] {
            Some(pred) => self.setpoint(range_action, pred),
            None => self.initial(range_action),
        }
    }

    /// Closest tap of a PST setpoint.
    pub fn tap(
        &self,
        perimeter: &OptimizationPerimeter,
        range_action: RangeActionId,
        state: StateId,
    ) -> Option<i32> {
        perimeter
            .range_action(range_action)
            .angle_to_tap(self.setpoint(range_action, state))
    }

    /// Explicitly activated (range action, state, value) triples.
    pub fn activated(&self) -> impl Iterator<Item = (RangeActionId, StateId, f64)> + '_ {
        self.values.iter().enumerate().filter_map(move |(slot, value)| {
            value.map(|v| {
                (
                    RangeActionId::new(slot / self.n_states),
                    StateId::new(slot % self.n_states),
                    v,
                )
            })
        })
    }

    /// Whether both assignments give the same setpoint everywhere, within `tolerance`.
    pub fn same_setpoints(&self, other: &SetpointAssignment, tolerance: f64) -> bool {
        if self.values.len() != other.values.len() {
            return false;
        }
        (0..self.initial.len()).all(|ra| {
            (0..self.n_states).all(|s| {
                let ra = RangeActionId::new(ra);
                let s = StateId::new(s);
                (self.setpoint(ra, s) - other.setpoint(ra, s)).abs() <= tolerance
            })
        })
    }
}
