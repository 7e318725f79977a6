//! The dispatcher's mode table as a pure function.
//!
//! [`transition`] takes the current [`Dispatch`] state, a snapshot of the
//! assembly state and one [`Event`], and returns the next dispatch state
//! plus the [`Effect`]s the message loop must carry out. It never performs
//! I/O, so every row of the table is testable without a runtime.

use crate::command::{bool_param, double_param, validate, CommandKey, CommandRequest, Commands};
use crate::core::{AssemblyState, Lifecycle, Motion, State, StateUpdate};
use crate::enforcement::{describe, Preconditions};
use crate::executors::{FollowUpdate, Report, RunId, Settlement};
use crate::params::{keys, Units};
use crate::status::{CommandStatus, Issue};
use std::fmt;

/// Identifies one submitted command's reply slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The command occupying the execution slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveCommand {
    pub run: RunId,
    pub key: CommandKey,
    pub ticket: Ticket,
    /// Assembly state when the command was accepted; restored on stop.
    pub prior: AssemblyState,
    /// Elevation of a setElevation run, remembered for following once the
    /// run completes.
    pub elevation: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Slot {
    Idle,
    Executing(ActiveCommand),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    NotFollowing(Slot),
    Following { run: RunId },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::NotFollowing(Slot::Idle) => f.write_str("NotFollowing/Idle"),
            Mode::NotFollowing(Slot::Executing(active)) => {
                write!(f, "NotFollowing/Executing({})", active.key)
            }
            Mode::Following { .. } => f.write_str("Following"),
        }
    }
}

/// Everything the dispatcher remembers between messages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dispatch {
    pub mode: Mode,
    /// Last elevation given by setElevation, used when following starts.
    pub follow_elevation: Option<f64>,
}

impl Default for Dispatch {
    fn default() -> Self {
        Self {
            mode: Mode::NotFollowing(Slot::Idle),
            follow_elevation: None,
        }
    }
}

impl Dispatch {
    pub fn is_following(&self) -> bool {
        matches!(self.mode, Mode::Following { .. })
    }

    pub fn active(&self) -> Option<&ActiveCommand> {
        match &self.mode {
            Mode::NotFollowing(Slot::Executing(active)) => Some(active),
            _ => None,
        }
    }

    /// True if state updates from `run` may be applied.
    pub fn owns(&self, run: RunId) -> bool {
        match self.mode {
            Mode::NotFollowing(Slot::Executing(active)) => active.run == run,
            Mode::Following { run: follow } => follow == run,
            Mode::NotFollowing(Slot::Idle) => false,
        }
    }

    fn with_mode(self, mode: Mode) -> Self {
        Self { mode, ..self }
    }
}

/// Inputs to the transition function.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A caller submitted a command. `run` is the identity its executor
    /// gets if one is started.
    Submit {
        ticket: Ticket,
        run: RunId,
        request: CommandRequest,
    },
    Report(Report),
    /// A setAngle/setElevation forwarded while following has settled.
    Settled {
        ticket: Ticket,
        update: FollowUpdate,
        settlement: Settlement,
    },
    FocusError(f64),
}

/// Work the message loop performs after a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Reply { ticket: Ticket, status: CommandStatus },
    SetState { update: StateUpdate, cause: String },
    Spawn {
        run: RunId,
        key: CommandKey,
        request: CommandRequest,
    },
    /// Stop the executor, then answer every ticket `Cancelled` once it has
    /// exited.
    StopExecutor { run: RunId, tickets: Vec<Ticket> },
    StartFollowing {
        run: RunId,
        nss_in_use: bool,
        elevation: Option<f64>,
    },
    Forward { update: FollowUpdate },
    /// Forward an update, wait for the axis to settle, then feed back
    /// [`Event::Settled`].
    Settle { ticket: Ticket, update: FollowUpdate },
    StopFollowing,
    Ignore { reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub next: Dispatch,
    pub effects: Vec<Effect>,
}

impl Step {
    fn stay(dispatch: &Dispatch, effects: Vec<Effect>) -> Self {
        Self {
            next: *dispatch,
            effects,
        }
    }

    fn reply(dispatch: &Dispatch, ticket: Ticket, status: CommandStatus) -> Self {
        Self::stay(dispatch, vec![Effect::Reply { ticket, status }])
    }
}

pub const STOP_NOT_EXECUTING: &str = "Trombone assembly must be executing a command to use stop";
pub const SET_ANGLE_NOT_FOLLOWING: &str = "Trombone assembly must be following for setAngle";
pub const NOT_WHILE_FOLLOWING: &str =
    "Trombone assembly cannot be following for datum, move, position, and follow";

/// Compute the next dispatch state and the effects of `event`.
pub fn transition(
    dispatch: &Dispatch,
    state: &AssemblyState,
    commands: &Commands,
    event: Event,
) -> Step {
    match event {
        Event::Submit {
            ticket,
            run,
            request,
        } => submit(dispatch, state, commands, ticket, run, request),
        Event::Report(report) => report_received(dispatch, report),
        Event::Settled {
            ticket,
            update,
            settlement,
        } => settled(dispatch, ticket, update, settlement),
        Event::FocusError(focus_error) => {
            if dispatch.is_following() {
                Step::stay(
                    dispatch,
                    vec![Effect::Forward {
                        update: FollowUpdate::FocusError(focus_error),
                    }],
                )
            } else {
                Step::stay(
                    dispatch,
                    vec![Effect::Ignore {
                        reason: format!("focus error {focus_error} while {}", dispatch.mode),
                    }],
                )
            }
        }
    }
}

fn submit(
    dispatch: &Dispatch,
    state: &AssemblyState,
    commands: &Commands,
    ticket: Ticket,
    run: RunId,
    request: CommandRequest,
) -> Step {
    let key = match commands.resolve(&request) {
        Some(key) => key,
        None => {
            return Step::reply(
                dispatch,
                ticket,
                CommandStatus::invalid(Issue::UnsupportedCommandInState {
                    prefix: request.prefix,
                    mode: dispatch.mode.to_string(),
                }),
            )
        }
    };

    if let Err(issue) = validate(key, &request) {
        return Step::reply(dispatch, ticket, CommandStatus::invalid(issue));
    }

    if key == CommandKey::Init {
        return Step::reply(dispatch, ticket, CommandStatus::Completed);
    }

    match dispatch.mode {
        Mode::NotFollowing(Slot::Idle) => idle(dispatch, state, key, ticket, run, request),
        Mode::NotFollowing(Slot::Executing(active)) => executing(dispatch, active, key, ticket),
        Mode::Following { .. } => following(dispatch, key, ticket, &request),
    }
}

fn idle(
    dispatch: &Dispatch,
    state: &AssemblyState,
    key: CommandKey,
    ticket: Ticket,
    run: RunId,
    request: CommandRequest,
) -> Step {
    match key {
        CommandKey::Datum | CommandKey::Move | CommandKey::Position | CommandKey::SetElevation => {
            let elevation = match key {
                CommandKey::SetElevation => {
                    double_param(&request.params, keys::ELEVATION, Units::Kilometers).ok()
                }
                _ => None,
            };
            let active = ActiveCommand {
                run,
                key,
                ticket,
                prior: *state,
                elevation,
            };
            Step {
                next: dispatch.with_mode(Mode::NotFollowing(Slot::Executing(active))),
                effects: vec![Effect::Spawn { run, key, request }],
            }
        }
        CommandKey::Follow => {
            if let Err(violations) = Preconditions::follow().check(state) {
                let message = format!(
                    "Assembly state of lifecycle={}/motion={}/sodiumLayerReady={} \
                     does not allow follow: {}",
                    state.lifecycle,
                    state.motion,
                    state.sodium_layer_ready,
                    describe(&violations)
                );
                return Step::reply(
                    dispatch,
                    ticket,
                    CommandStatus::no_longer_valid(Issue::wrong_state(message)),
                );
            }
            let nss_in_use = bool_param(&request.params, keys::NSS_IN_USE).unwrap_or(false);
            Step {
                next: dispatch.with_mode(Mode::Following { run }),
                effects: vec![
                    Effect::StartFollowing {
                        run,
                        nss_in_use,
                        elevation: dispatch.follow_elevation,
                    },
                    Effect::SetState {
                        update: StateUpdate::new()
                            .lifecycle(Lifecycle::Continuous)
                            .motion(Motion::Moving)
                            .nss_in_use(nss_in_use),
                        cause: "follow".to_string(),
                    },
                    Effect::Reply {
                        ticket,
                        status: CommandStatus::Completed,
                    },
                ],
            }
        }
        CommandKey::Stop => Step::reply(
            dispatch,
            ticket,
            CommandStatus::invalid(Issue::wrong_state(STOP_NOT_EXECUTING)),
        ),
        CommandKey::SetAngle => Step::reply(
            dispatch,
            ticket,
            CommandStatus::invalid(Issue::wrong_state(SET_ANGLE_NOT_FOLLOWING)),
        ),
        CommandKey::Init => Step::reply(dispatch, ticket, CommandStatus::Completed),
    }
}

fn executing(dispatch: &Dispatch, active: ActiveCommand, key: CommandKey, ticket: Ticket) -> Step {
    if key != CommandKey::Stop {
        return Step::reply(
            dispatch,
            ticket,
            CommandStatus::invalid(Issue::wrong_state(format!(
                "Trombone assembly is busy executing {}",
                active.key
            ))),
        );
    }

    Step {
        next: dispatch.with_mode(Mode::NotFollowing(Slot::Idle)),
        effects: vec![
            Effect::StopExecutor {
                run: active.run,
                tickets: vec![active.ticket, ticket],
            },
            Effect::SetState {
                update: StateUpdate::new()
                    .lifecycle(active.prior.lifecycle)
                    .motion(active.prior.motion),
                cause: format!("stop {}", active.key),
            },
        ],
    }
}

fn following(
    dispatch: &Dispatch,
    key: CommandKey,
    ticket: Ticket,
    request: &CommandRequest,
) -> Step {
    let forward = |update: FollowUpdate, next: Dispatch| Step {
        next,
        effects: vec![
            Effect::SetState {
                update: StateUpdate::new().lifecycle(Lifecycle::Busy),
                cause: key.to_string(),
            },
            Effect::Settle { ticket, update },
        ],
    };

    match key {
        CommandKey::SetAngle => {
            match double_param(&request.params, keys::ZENITH_ANGLE, Units::Degrees) {
                Ok(za) => forward(FollowUpdate::ZenithAngle(za), *dispatch),
                Err(issue) => Step::reply(dispatch, ticket, CommandStatus::invalid(issue)),
            }
        }
        CommandKey::SetElevation => {
            match double_param(&request.params, keys::ELEVATION, Units::Kilometers) {
                Ok(el) => forward(FollowUpdate::Elevation(el), *dispatch),
                Err(issue) => Step::reply(dispatch, ticket, CommandStatus::invalid(issue)),
            }
        }
        CommandKey::Stop => Step {
            next: dispatch.with_mode(Mode::NotFollowing(Slot::Idle)),
            effects: vec![
                Effect::StopFollowing,
                Effect::SetState {
                    update: StateUpdate::ready_indexed(),
                    cause: "stop following".to_string(),
                },
                Effect::Reply {
                    ticket,
                    status: CommandStatus::Completed,
                },
            ],
        },
        CommandKey::Datum | CommandKey::Move | CommandKey::Position | CommandKey::Follow => {
            Step::reply(
                dispatch,
                ticket,
                CommandStatus::invalid(Issue::wrong_state(NOT_WHILE_FOLLOWING)),
            )
        }
        CommandKey::Init => Step::reply(dispatch, ticket, CommandStatus::Completed),
    }
}

fn report_received(dispatch: &Dispatch, report: Report) -> Step {
    match report {
        Report::StateUpdate { run, update } => {
            if dispatch.owns(run) {
                Step::stay(
                    dispatch,
                    vec![Effect::SetState {
                        update,
                        cause: format!("run {run}"),
                    }],
                )
            } else {
                Step::stay(
                    dispatch,
                    vec![Effect::Ignore {
                        reason: format!("state update from inactive run {run}"),
                    }],
                )
            }
        }
        Report::Finished { run, status } => match dispatch.active() {
            Some(active) if active.run == run => {
                let mut next = dispatch.with_mode(Mode::NotFollowing(Slot::Idle));
                if status.is_completed() && active.elevation.is_some() {
                    next.follow_elevation = active.elevation;
                }
                Step {
                    next,
                    effects: vec![Effect::Reply {
                        ticket: active.ticket,
                        status,
                    }],
                }
            }
            _ => Step::stay(
                dispatch,
                vec![Effect::Ignore {
                    reason: format!("status {status} from inactive run {run}"),
                }],
            ),
        },
    }
}

/// A rejected update moved nothing, so `Continuous` comes back as for a
/// completed one. A failed match after an accepted update leaves `Busy`.
fn settled(
    dispatch: &Dispatch,
    ticket: Ticket,
    update: FollowUpdate,
    settlement: Settlement,
) -> Step {
    let Settlement { applied, status } = settlement;
    let mut next = *dispatch;
    let mut effects = Vec::new();

    if dispatch.is_following() {
        if let (true, FollowUpdate::Elevation(el)) = (applied, update) {
            next.follow_elevation = Some(el);
        }
        if status.is_completed() || !applied {
            let cause = if applied {
                "follow settled"
            } else {
                "follow update rejected"
            };
            effects.push(Effect::SetState {
                update: StateUpdate::new().lifecycle(Lifecycle::Continuous),
                cause: cause.to_string(),
            });
        }
    }
    effects.push(Effect::Reply { ticket, status });
    Step { next, effects }
}

/// Check an externally requested state update against the mode.
///
/// `Continuous` is only allowed while following, and `Moving` only while an
/// executor is active or the assembly is following.
pub fn validate_external_update(
    dispatch: &Dispatch,
    state: &AssemblyState,
    update: &StateUpdate,
) -> Result<(), String> {
    let next = state.apply(update);
    let mut problems = Vec::new();

    if next.lifecycle == Lifecycle::Continuous && !dispatch.is_following() {
        problems.push(format!(
            "lifecycle Continuous requires following, mode is {}",
            dispatch.mode
        ));
    }
    if next.motion == Motion::Moving && dispatch.mode == Mode::NotFollowing(Slot::Idle) {
        problems.push("motion Moving requires an active command or following".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("{}: {}", next.summary(), problems.join("; ")))
    }
}
