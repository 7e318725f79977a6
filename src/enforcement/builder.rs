//! Builder API for command preconditions.

use crate::core::{AssemblyState, Guard, Lifecycle, Motion};
use crate::enforcement::rules::{PreconditionCheck, Preconditions};
use crate::enforcement::violations::Violation;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Builder for [`Preconditions`].
pub struct PreconditionBuilder {
    checks: Vec<PreconditionCheck>,
}

impl PreconditionBuilder {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Add a custom validation check
    pub fn require<F>(mut self, check: F) -> Self
    where
        F: Fn(&AssemblyState) -> Validation<(), NonEmptyVec<Violation>> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    /// Add a guard; `violation` describes the failure from the offending state.
    pub fn require_guard<F>(self, guard: Guard<AssemblyState>, violation: F) -> Self
    where
        F: Fn(&AssemblyState) -> Violation + Send + Sync + 'static,
    {
        self.require(move |state: &AssemblyState| {
            if guard.check(state) {
                Validation::success(())
            } else {
                Validation::fail(violation(state))
            }
        })
    }

    /// Lifecycle must not be `Uninitialized`.
    pub fn initialized(self) -> Self {
        self.require_guard(
            Guard::new(|s: &AssemblyState| s.lifecycle != Lifecycle::Uninitialized),
            |s| Violation::Lifecycle { found: s.lifecycle },
        )
    }

    /// Motion must be `Indexed` or `Moving`.
    pub fn indexed(self) -> Self {
        self.require_guard(
            Guard::new(|s: &AssemblyState| matches!(s.motion, Motion::Indexed | Motion::Moving)),
            |s| Violation::Motion { found: s.motion },
        )
    }

    pub fn sodium_layer_ready(self) -> Self {
        self.require_guard(
            Guard::new(|s: &AssemblyState| s.sodium_layer_ready),
            |_| Violation::SodiumLayerNotReady,
        )
    }

    pub fn build(self) -> Preconditions {
        Preconditions {
            checks: self.checks,
        }
    }
}

impl Default for PreconditionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
