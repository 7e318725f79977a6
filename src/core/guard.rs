//! Guard predicates over state values.
//!
//! Guards are pure boolean functions. Command preconditions are built from
//! them (see [`crate::enforcement`]).

use super::state::State;
use std::marker::PhantomData;
use std::sync::Arc;

/// Pure predicate that decides whether something may happen in a state.
///
/// # Example
///
/// ```rust
/// use trombone::core::{AssemblyState, Guard, Lifecycle, Motion};
///
/// let initialized = Guard::new(|s: &AssemblyState| s.lifecycle != Lifecycle::Uninitialized);
///
/// let mut state = AssemblyState::default();
/// assert!(!initialized.check(&state));
///
/// state.lifecycle = Lifecycle::Ready;
/// state.motion = Motion::Indexed;
/// assert!(initialized.check(&state));
/// ```
pub struct Guard<S: State> {
    predicate: Arc<dyn Fn(&S) -> bool + Send + Sync>,
    _phantom: PhantomData<S>,
}

impl<S: State> Guard<S> {
    /// Create a guard from a pure predicate function.
    ///
    /// The predicate must be deterministic and free of side effects.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
            _phantom: PhantomData,
        }
    }

    /// Check if the guard allows the given state.
    pub fn check(&self, state: &S) -> bool {
        (self.predicate)(state)
    }
}

impl<S: State> Clone for Guard<S> {
    fn clone(&self) -> Self {
        Guard {
            predicate: Arc::clone(&self.predicate),
            _phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AssemblyState, Lifecycle, Motion};

    fn indexed() -> Guard<AssemblyState> {
        Guard::new(|s: &AssemblyState| s.motion == Motion::Indexed)
    }

    fn ready() -> Guard<AssemblyState> {
        Guard::new(|s: &AssemblyState| s.lifecycle == Lifecycle::Ready)
    }

    #[test]
    fn guard_allows_matching_states() {
        let guard = ready();
        let state = AssemblyState {
            lifecycle: Lifecycle::Ready,
            ..AssemblyState::default()
        };

        assert!(guard.check(&state));
        assert!(!guard.check(&AssemblyState::default()));
    }

    #[test]
    fn guard_is_deterministic() {
        let state = AssemblyState::default();
        let guard = indexed();

        assert_eq!(guard.check(&state), guard.check(&state));
    }

    #[test]
    fn cloned_guard_shares_predicate() {
        let guard = indexed();
        let cloned = guard.clone();
        let state = AssemblyState {
            motion: Motion::Indexed,
            ..AssemblyState::default()
        };

        assert_eq!(guard.check(&state), cloned.check(&state));
    }
}
