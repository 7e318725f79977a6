//! Command preconditions built on `stillwater::Validation`.
//!
//! A failed precondition reports every offending field at once, so a
//! rejected `follow` names lifecycle, motion and the sodium layer together
//! when all three are wrong.
//!
//! # Example
//!
//! ```rust
//! use trombone::core::AssemblyState;
//! use trombone::enforcement::{Preconditions, Violation};
//!
//! let violations = Preconditions::follow()
//!     .check(&AssemblyState::default())
//!     .unwrap_err();
//!
//! assert_eq!(violations.len(), 3);
//! assert!(violations.contains(&Violation::SodiumLayerNotReady));
//! ```

pub mod builder;
pub mod rules;
pub mod violations;

pub use builder::PreconditionBuilder;
pub use rules::{PreconditionCheck, Preconditions};
pub use violations::{describe, Violation};
