//! Precondition violations.

use crate::core::{Lifecycle, Motion};
use thiserror::Error;

/// A single reason why the assembly state does not allow a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("lifecycle is {found}, must not be Uninitialized")]
    Lifecycle { found: Lifecycle },

    #[error("motion is {found}, must be Indexed or Moving")]
    Motion { found: Motion },

    #[error("sodium layer is not ready")]
    SodiumLayerNotReady,

    #[error("{message}")]
    Custom { message: String },
}

/// Render a list of violations as one `; `-separated line.
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_field() {
        let violation = Violation::Motion {
            found: Motion::NotIndexed,
        };
        assert_eq!(
            violation.to_string(),
            "motion is NotIndexed, must be Indexed or Moving"
        );
    }

    #[test]
    fn describe_joins_in_order() {
        let text = describe(&[
            Violation::Lifecycle {
                found: Lifecycle::Uninitialized,
            },
            Violation::SodiumLayerNotReady,
        ]);
        assert_eq!(
            text,
            "lifecycle is Uninitialized, must not be Uninitialized; sodium layer is not ready"
        );
    }
}
