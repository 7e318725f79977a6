//! Terminal command status and the issues carried by rejections.

use crate::params::Units;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a command was rejected.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Issue {
    /// The assembly's mode or state does not allow the command.
    #[error("{message}")]
    WrongInternalState { message: String },

    #[error(
        "Trombone assembly does not support the command {prefix} in the current state ({mode})."
    )]
    UnsupportedCommandInState { prefix: String, mode: String },

    #[error("missing required parameter {key}")]
    MissingKey { key: String },

    #[error("parameter {key} must be {expected}, found {found}")]
    WrongParameterType {
        key: String,
        expected: String,
        found: String,
    },

    #[error("parameter {key} must be in {expected}, found {found}")]
    WrongUnits {
        key: String,
        expected: Units,
        found: Units,
    },

    #[error("parameter {key} is out of range: {message}")]
    OutOfRange { key: String, message: String },
}

impl Issue {
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Issue::WrongInternalState {
            message: message.into(),
        }
    }
}

/// Exactly one of these is delivered for every submitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandStatus {
    Completed,
    Cancelled,
    Error { message: String },
    Invalid { issue: Issue },
    NoLongerValid { issue: Issue },
}

impl CommandStatus {
    pub fn error(message: impl Into<String>) -> Self {
        CommandStatus::Error {
            message: message.into(),
        }
    }

    pub fn invalid(issue: Issue) -> Self {
        CommandStatus::Invalid { issue }
    }

    pub fn no_longer_valid(issue: Issue) -> Self {
        CommandStatus::NoLongerValid { issue }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CommandStatus::Completed)
    }

    /// True for `Invalid` and `NoLongerValid`.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CommandStatus::Invalid { .. } | CommandStatus::NoLongerValid { .. }
        )
    }

    /// Human-readable reason, if the status carries one.
    pub fn message(&self) -> Option<String> {
        match self {
            CommandStatus::Completed | CommandStatus::Cancelled => None,
            CommandStatus::Error { message } => Some(message.clone()),
            CommandStatus::Invalid { issue } | CommandStatus::NoLongerValid { issue } => {
                Some(issue.to_string())
            }
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Completed => f.write_str("Completed"),
            CommandStatus::Cancelled => f.write_str("Cancelled"),
            CommandStatus::Error { message } => write!(f, "Error({message})"),
            CommandStatus::Invalid { issue } => write!(f, "Invalid({issue})"),
            CommandStatus::NoLongerValid { issue } => write!(f, "NoLongerValid({issue})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_kinds() {
        assert!(CommandStatus::invalid(Issue::wrong_state("busy")).is_rejection());
        assert!(CommandStatus::no_longer_valid(Issue::wrong_state("x")).is_rejection());
        assert!(!CommandStatus::error("timeout").is_rejection());
        assert!(!CommandStatus::Cancelled.is_rejection());
    }

    #[test]
    fn message_of_each_status() {
        assert_eq!(CommandStatus::Completed.message(), None);
        assert_eq!(
            CommandStatus::error("timeout").message().as_deref(),
            Some("timeout")
        );
        assert_eq!(
            CommandStatus::invalid(Issue::MissingKey {
                key: "elevation".to_string()
            })
            .message()
            .as_deref(),
            Some("missing required parameter elevation")
        );
    }

    #[test]
    fn display_wraps_reason() {
        assert_eq!(CommandStatus::error("timeout").to_string(), "Error(timeout)");
        assert_eq!(CommandStatus::Completed.to_string(), "Completed");
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_string(&CommandStatus::error("timeout")).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"timeout"}"#);
    }
}
