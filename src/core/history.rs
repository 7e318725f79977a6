//! History of applied assembly state changes.
//!
//! The dispatcher records every change it applies, together with what caused
//! it. Histories are immutable: `record` returns a new value.

use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single state change.
///
/// # Example
///
/// ```rust
/// use trombone::core::{AssemblyState, StateTransition, StateUpdate};
/// use chrono::Utc;
///
/// let from = AssemblyState::default();
/// let transition = StateTransition {
///     from,
///     to: from.apply(&StateUpdate::busy_moving()),
///     timestamp: Utc::now(),
///     cause: "datum".to_string(),
/// };
/// assert_eq!(transition.cause, "datum");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateTransition<S: State> {
    /// The state before the change
    pub from: S,
    /// The state after the change
    pub to: S,
    /// When the change was applied
    pub timestamp: DateTime<Utc>,
    /// What requested the change (command key, run, or external source)
    pub cause: String,
}

/// Ordered, bounded history of state changes.
///
/// When a limit is set, the oldest entries are dropped first.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateHistory<S: State> {
    transitions: Vec<StateTransition<S>>,
    limit: Option<usize>,
}

impl<S: State> Default for StateHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> StateHistory<S> {
    /// Create an empty, unbounded history.
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
            limit: None,
        }
    }

    /// Create an empty history that keeps at most `limit` entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            transitions: Vec::new(),
            limit: Some(limit.max(1)),
        }
    }

    /// Record a transition, returning the new history (pure).
    pub fn record(&self, transition: StateTransition<S>) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        if let Some(limit) = self.limit {
            let excess = transitions.len().saturating_sub(limit);
            transitions.drain(..excess);
        }
        Self {
            transitions,
            limit: self.limit,
        }
    }

    /// Sequence of states: the first recorded `from`, then every `to`.
    pub fn get_path(&self) -> Vec<&S> {
        let mut path = Vec::new();
        if let Some(first) = self.transitions.first() {
            path.push(&first.from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    /// Time between the first and last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[StateTransition<S>] {
        &self.transitions
    }

    pub fn last(&self) -> Option<&StateTransition<S>> {
        self.transitions.last()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
