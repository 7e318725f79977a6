//! Command preconditions over the assembly state, using Validation.

use crate::core::AssemblyState;
use crate::enforcement::builder::PreconditionBuilder;
use crate::enforcement::violations::Violation;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

/// Type alias for precondition check functions
pub type PreconditionCheck =
    Box<dyn Fn(&AssemblyState) -> Validation<(), NonEmptyVec<Violation>> + Send + Sync>;

/// A set of checks a command requires of the assembly state.
/// Every failing check is reported, not just the first.
pub struct Preconditions {
    pub(crate) checks: Vec<PreconditionCheck>,
}

impl Preconditions {
    /// Requirements of move, position and setElevation: initialized and indexed.
    pub fn motion() -> Self {
        PreconditionBuilder::new().initialized().indexed().build()
    }

    /// Requirements of follow: motion requirements plus a ready sodium layer.
    pub fn follow() -> Self {
        PreconditionBuilder::new()
            .initialized()
            .indexed()
            .sodium_layer_ready()
            .build()
    }

    /// Run every check, accumulating all violations.
    pub fn enforce(&self, state: &AssemblyState) -> Validation<(), NonEmptyVec<Violation>> {
        let checks: Vec<Validation<(), NonEmptyVec<Violation>>> =
            self.checks.iter().map(|check| check(state)).collect();

        Validation::all_vec(checks).map(|_| ())
    }

    /// [`Preconditions::enforce`] as a `Result`, for callers that only report.
    pub fn check(&self, state: &AssemblyState) -> Result<(), Vec<Violation>> {
        match self.enforce(state) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => Err(errors.iter().cloned().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}
