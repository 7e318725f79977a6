//! Errors returned by the [`Assembly`](crate::Assembly) handle.

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dispatcher has shut down.
    #[error("assembly dispatcher is not running")]
    NotRunning,

    /// An external state update would break the mode invariants.
    #[error("state update rejected: {0}")]
    StateRejected(String),
}
