//! Pure core of the assembly: state values, guards and history.
//!
//! - [`AssemblyState`] and its partial [`StateUpdate`]
//! - [`Guard`] predicates over state values
//! - Immutable [`StateHistory`] of applied changes
//!
//! Nothing in this module performs I/O or touches a runtime.

#[macro_use]
mod macros;
mod guard;
mod history;
mod state;

pub use guard::Guard;
pub use history::{StateHistory, StateTransition};
pub use state::{AssemblyState, Lifecycle, Motion, State, StateUpdate};
