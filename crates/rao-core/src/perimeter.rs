//! Optimisation perimeter: the states in scope, their cnecs, and which range
//! actions are available at which state.
//!
//! ## Predecessor index
//!
//! Every non-preventive state has at most one logical predecessor in scope:
//! the state with the same contingency at the closest earlier instant, or the
//! preventive state. The index is computed once by [`PerimeterBuilder::build`]
//! and walked iteratively ([`OptimizationPerimeter::chain`]); it is validated
//! to be acyclic and to strictly decrease instant order along every edge.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashSet};

use crate::cnec::Cnec;
use crate::error::{RaoError, RaoResult};
use crate::range_action::RangeAction;
use crate::state::{Instant, State};
use crate::{CnecId, RangeActionId, StateId};

/// Accumulates states, cnecs and range actions before validation.
#[derive(Debug, Default)]
pub struct PerimeterBuilder {
    states: Vec<State>,
    cnecs: Vec<Cnec>,
    range_actions: Vec<RangeAction>,
    availability: Vec<(RangeActionId, StateId)>,
    explicit_predecessors: Vec<(StateId, StateId)>,
}

impl PerimeterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, instant: Instant, contingency: Option<&str>) -> StateId {
        let id = StateId::new(self.states.len());
        self.states.push(State {
            id,
            instant,
            contingency: contingency.map(str::to_string),
        });
        id
    }

    pub fn add_cnec(&mut self, cnec: Cnec) -> CnecId {
        let id = CnecId::new(self.cnecs.len());
        self.cnecs.push(cnec);
        id
    }

    pub fn add_range_action(&mut self, range_action: RangeAction) -> RangeActionId {
        let id = RangeActionId::new(self.range_actions.len());
        self.range_actions.push(range_action);
        id
    }

    /// Declare `range_action` optimisable at `state`.
    pub fn make_available(&mut self, range_action: RangeActionId, state: StateId) -> &mut Self {
        self.availability.push((range_action, state));
        self
    }

    /// Override the default predecessor of `state`.
    pub fn set_predecessor(&mut self, state: StateId, predecessor: StateId) -> &mut Self {
        self.explicit_predecessors.push((state, predecessor));
        self
    }

    pub fn build(self) -> RaoResult<OptimizationPerimeter> {
        let n_states = self.states.len();
        if n_states == 0 {
            return Err(RaoError::Structural("perimeter has no state".into()));
        }

        let mut seen = HashSet::new();
        let mut preventive_count = 0;
        for state in &self.states {
            if !seen.insert((state.instant.id.clone(), state.contingency.clone())) {
                return Err(RaoError::Structural(format!(
                    "state {} is declared twice",
                    state.label()
                )));
            }
            match (state.is_preventive(), &state.contingency) {
                (true, Some(co)) => {
                    return Err(RaoError::Structural(format!(
                        "preventive state cannot follow contingency {co}"
                    )))
                }
                (false, None) => {
                    return Err(RaoError::Structural(format!(
                        "state at instant {} has no contingency",
                        state.instant.id
                    )))
                }
                _ => {}
            }
            if state.is_preventive() {
                preventive_count += 1;
            }
        }
        if preventive_count > 1 {
            return Err(RaoError::Structural(
                "perimeter contains more than one preventive state".into(),
            ));
        }

        for (index, cnec) in self.cnecs.iter().enumerate() {
            if cnec.state.value() >= n_states {
                return Err(RaoError::Structural(format!(
                    "cnec {} (#{index}) references state #{} outside the perimeter",
                    cnec.name,
                    cnec.state.value()
                )));
            }
        }

        let mut range_actions_per_state: Vec<Vec<RangeActionId>> = vec![Vec::new(); n_states];
        for &(ra, state) in &self.availability {
            if ra.value() >= self.range_actions.len() {
                return Err(RaoError::Structural(format!(
                    "range action #{} is not declared",
                    ra.value()
                )));
            }
            if state.value() >= n_states {
                return Err(RaoError::Structural(format!(
                    "range action {} is made available at state #{} outside the perimeter",
                    self.range_actions[ra.value()].name,
                    state.value()
                )));
            }
            let slot = &mut range_actions_per_state[state.value()];
            if !slot.contains(&ra) {
                slot.push(ra);
            }
        }
        for slot in &mut range_actions_per_state {
            slot.sort();
        }

        let mut predecessors = default_predecessors(&self.states);
        for &(state, predecessor) in &self.explicit_predecessors {
            if state.value() >= n_states || predecessor.value() >= n_states {
                return Err(RaoError::Structural(format!(
                    "predecessor override #{} -> #{} references a state outside the perimeter",
                    state.value(),
                    predecessor.value()
                )));
            }
            predecessors[state.value()] = Some(predecessor);
        }

        check_predecessor_graph(&self.states, &predecessors)?;

        let mut ordered_states: Vec<StateId> = self.states.iter().map(|s| s.id).collect();
        ordered_states.sort_by(|a, b| {
            self.states[a.value()]
                .instant
                .cmp(&self.states[b.value()].instant)
                .then(a.cmp(b))
        });

        Ok(OptimizationPerimeter {
            states: self.states,
            ordered_states,
            predecessors,
            cnecs: self.cnecs,
            range_actions: self.range_actions,
            range_actions_per_state,
        })
    }
}

/// Same contingency at the closest earlier instant, else the preventive state.
fn default_predecessors(states: &[State]) -> Vec<Option<StateId>> {
    let preventive = states.iter().find(|s| s.is_preventive()).map(|s| s.id);
    states
        .iter()
        .map(|state| {
            if state.is_preventive() {
                return None;
            }
            states
                .iter()
                .filter(|other| {
                    other.contingency == state.contingency
                        && other.instant.order < state.instant.order
                })
                .max_by_key(|other| other.instant.order)
                .map(|other| other.id)
                .or(preventive)
        })
        .collect()
}

fn check_predecessor_graph(states: &[State], predecessors: &[Option<StateId>]) -> RaoResult<()> {
    let mut graph: DiGraph<StateId, ()> = DiGraph::with_capacity(states.len(), states.len());
    let nodes: Vec<NodeIndex> = states.iter().map(|s| graph.add_node(s.id)).collect();
    for (index, predecessor) in predecessors.iter().enumerate() {
        if let Some(pred) = predecessor {
            if pred.value() == index {
                return Err(RaoError::Structural(format!(
                    "state {} is its own predecessor",
                    states[index].label()
                )));
            }
            graph.add_edge(nodes[index], nodes[pred.value()], ());
        }
    }
    if is_cyclic_directed(&graph) {
        return Err(RaoError::Structural(
            "state predecessor chain is cyclic".into(),
        ));
    }

    for (index, predecessor) in predecessors.iter().enumerate() {
        if let Some(pred) = predecessor {
            let state = &states[index];
            let pred_state = &states[pred.value()];
            if pred_state.instant.order >= state.instant.order {
                return Err(RaoError::Structural(format!(
                    "predecessor {} of state {} is not at an earlier instant",
                    pred_state.label(),
                    state.label()
                )));
            }
            if pred_state.contingency.is_some() && pred_state.contingency != state.contingency {
                return Err(RaoError::Structural(format!(
                    "predecessor {} of state {} follows another contingency",
                    pred_state.label(),
                    state.label()
                )));
            }
        }
    }
    Ok(())
}

/// Immutable optimisation scope, shared read-only across controllers.
#[derive(Debug, Clone)]
pub struct OptimizationPerimeter {
    states: Vec<State>,
    ordered_states: Vec<StateId>,
    predecessors: Vec<Option<StateId>>,
    cnecs: Vec<Cnec>,
    range_actions: Vec<RangeAction>,
    range_actions_per_state: Vec<Vec<RangeActionId>>,
}

impl OptimizationPerimeter {
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.value()]
    }

    /// States sorted by instant order.
    pub fn states(&self) -> &[StateId] {
        &self.ordered_states
    }

    pub fn predecessor(&self, state: StateId) -> Option<StateId> {
        self.predecessors[state.value()]
    }

    /// `state`, its predecessor, the predecessor's predecessor, ...
    pub fn chain(&self, state: StateId) -> Vec<StateId> {
        let mut chain = Vec::new();
        let mut current = Some(state);
        // build() guarantees acyclicity; the bound only protects the walk
        while let Some(s) = current {
            if chain.len() > self.states.len() {
                break;
            }
            chain.push(s);
            current = self.predecessors[s.value()];
        }
        chain
    }

    pub fn range_actions_at(&self, state: StateId) -> &[RangeActionId] {
        &self.range_actions_per_state[state.value()]
    }

    pub fn is_available(&self, range_action: RangeActionId, state: StateId) -> bool {
        self.range_actions_at(state).contains(&range_action)
    }

    /// (range action, state) pairs in instant order.
    pub fn range_action_states(&self) -> Vec<(RangeActionId, StateId)> {
        self.ordered_states
            .iter()
            .flat_map(|&state| {
                self.range_actions_at(state)
                    .iter()
                    .map(move |&ra| (ra, state))
            })
            .collect()
    }

    /// Range actions acting on a cnec, each paired with the latest state of
    /// the cnec's chain where `optimised` accepts it.
    pub fn range_actions_acting_on(
        &self,
        cnec: CnecId,
        mut optimised: impl FnMut(RangeActionId, StateId) -> bool,
    ) -> Vec<(RangeActionId, StateId)> {
        let mut considered = BTreeSet::new();
        let mut acting = Vec::new();
        for state in self.chain(self.cnec(cnec).state) {
            for &ra in self.range_actions_at(state) {
                if !considered.contains(&ra) && optimised(ra, state) {
                    considered.insert(ra);
                    acting.push((ra, state));
                }
            }
        }
        acting
    }

    pub fn cnec(&self, id: CnecId) -> &Cnec {
        &self.cnecs[id.value()]
    }

    pub fn cnec_ids(&self) -> impl Iterator<Item = CnecId> + '_ {
        (0..self.cnecs.len()).map(CnecId::new)
    }

    pub fn optimized_cnecs(&self) -> impl Iterator<Item = CnecId> + '_ {
        self.cnec_ids().filter(|&id| self.cnec(id).optimized)
    }

    /// Monitored cnecs that are not optimized (MNECs).
    pub fn monitored_cnecs(&self) -> impl Iterator<Item = CnecId> + '_ {
        self.cnec_ids()
            .filter(|&id| self.cnec(id).monitored && !self.cnec(id).optimized)
    }

    pub fn loop_flow_cnecs(&self) -> impl Iterator<Item = CnecId> + '_ {
        self.cnec_ids()
            .filter(|&id| self.cnec(id).loop_flow_threshold_mw.is_some())
    }

    pub fn num_cnecs(&self) -> usize {
        self.cnecs.len()
    }

    pub fn range_action(&self, id: RangeActionId) -> &RangeAction {
        &self.range_actions[id.value()]
    }

    pub fn range_action_ids(&self) -> impl Iterator<Item = RangeActionId> + '_ {
        (0..self.range_actions.len()).map(RangeActionId::new)
    }

    pub fn num_range_actions(&self) -> usize {
        self.range_actions.len()
    }
}
