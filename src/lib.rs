//! Trombone: the command core of a sodium-layer trombone assembly.
//!
//! The assembly accepts commands, checks each against its current operating
//! mode, runs motion commands in isolated executors and waits for device
//! telemetry to reach the demanded position before reporting completion.
//!
//! The crate follows a "pure core, imperative shell" split:
//!
//! - **Pure core**: [`core`] state values and history, [`enforcement`]
//!   preconditions, [`algorithms`] unit conversions and the dispatcher's
//!   [`transition`](dispatcher::transition) function.
//! - **Shell**: the [`Assembly`] dispatcher loop, [`executors`] and the
//!   [`matcher`], all on tokio.
//!
//! # Example
//!
//! ```rust
//! use trombone::config::AssemblyConfig;
//! use trombone::device::{AxisConfig, SimulatedAxis};
//! use trombone::core::{Lifecycle, Motion};
//! use trombone::{Assembly, CommandStatus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), trombone::AssemblyError> {
//! let axis = SimulatedAxis::spawn(AxisConfig::default());
//! let assembly = Assembly::spawn(AssemblyConfig::default(), axis)?;
//! let commands = assembly.commands().clone();
//!
//! assert_eq!(assembly.execute(commands.datum()).await?, CommandStatus::Completed);
//! assert_eq!(assembly.execute(commands.move_to(10.0)).await?, CommandStatus::Completed);
//!
//! let state = assembly.current_state();
//! assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));
//! assembly.shutdown().await
//! # }
//! ```

pub mod algorithms;
pub mod command;
pub mod config;
pub mod core;
pub mod device;
pub mod dispatcher;
pub mod enforcement;
pub mod error;
pub mod executors;
pub mod logging;
pub mod matcher;
pub mod params;
pub mod status;

pub use command::{CommandKey, CommandRequest, Commands};
pub use core::{
    AssemblyState, Guard, Lifecycle, Motion, State, StateHistory, StateTransition, StateUpdate,
};
pub use dispatcher::{Assembly, PendingStatus};
pub use error::AssemblyError;
pub use status::{CommandStatus, Issue};
