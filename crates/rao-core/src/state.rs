//! Instants and grid states.
//!
//! A state is an (instant, contingency) pair. Instants are totally ordered:
//! preventive < outage < auto < curative-1 < curative-2 < ...

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::StateId;

/// Phase of the grid timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantKind {
    Preventive,
    Outage,
    Auto,
    Curative,
}

impl fmt::Display for InstantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstantKind::Preventive => write!(f, "preventive"),
            InstantKind::Outage => write!(f, "outage"),
            InstantKind::Auto => write!(f, "auto"),
            InstantKind::Curative => write!(f, "curative"),
        }
    }
}

/// An ordered instant of the grid timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instant {
    pub id: String,
    pub kind: InstantKind,
    pub order: u32,
}

impl Instant {
    pub fn new(id: impl Into<String>, kind: InstantKind, order: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            order,
        }
    }

    pub fn preventive() -> Self {
        Self::new("preventive", InstantKind::Preventive, 0)
    }

    pub fn outage() -> Self {
        Self::new("outage", InstantKind::Outage, 1)
    }

    pub fn auto() -> Self {
        Self::new("auto", InstantKind::Auto, 2)
    }

    /// k-th curative instant (k starts at 1).
    pub fn curative(k: u32) -> Self {
        Self::new(format!("curative{k}"), InstantKind::Curative, 2 + k.max(1))
    }

    pub fn is_preventive(&self) -> bool {
        self.kind == InstantKind::Preventive
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A grid state: an instant, and the contingency it follows (none for preventive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub instant: Instant,
    pub contingency: Option<String>,
}

impl State {
    pub fn is_preventive(&self) -> bool {
        self.instant.is_preventive()
    }

    /// Human-readable label, e.g. `"co1 - curative1"` or `"preventive"`.
    pub fn label(&self) -> String {
        match &self.contingency {
            Some(co) => format!("{} - {}", co, self.instant.id),
            None => self.instant.id.clone(),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_ordering() {
        let mut instants = vec![
            Instant::curative(2),
            Instant::auto(),
            Instant::preventive(),
            Instant::curative(1),
            Instant::outage(),
        ];
        instants.sort();
        let ids: Vec<&str> = instants.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["preventive", "outage", "auto", "curative1", "curative2"]
        );
    }

    #[test]
    fn test_state_label() {
        let state = State {
            id: StateId::new(3),
            instant: Instant::curative(1),
            contingency: Some("co1".into()),
        };
        assert_eq!(state.label(), "co1 - curative1");
        assert!(!state.is_preventive());
    }
}
