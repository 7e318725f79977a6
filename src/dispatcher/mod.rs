//! The command dispatcher: one task that owns the assembly state and the
//! execution slot.
//!
//! Callers talk to it through the [`Assembly`] handle. Every input, whether
//! a command from a caller or a report from an executor, arrives on one
//! ordered inbox and is run through the pure [`transition`] function; the
//! loop then carries out the resulting [`Effect`]s. The loop never awaits an
//! executor, a matcher or the device.
//!
//! ```rust,no_run
//! use trombone::config::AssemblyConfig;
//! use trombone::device::{AxisConfig, SimulatedAxis};
//! use trombone::{Assembly, CommandStatus};
//!
//! # async fn demo() -> Result<(), trombone::AssemblyError> {
//! let axis = SimulatedAxis::spawn(AxisConfig::default());
//! let assembly = Assembly::spawn(AssemblyConfig::default(), axis)?;
//!
//! let datum = assembly.commands().datum();
//! assert_eq!(assembly.execute(datum).await?, CommandStatus::Completed);
//! assembly.shutdown().await
//! # }
//! ```

use crate::command::{CommandRequest, Commands};
use crate::config::AssemblyConfig;
use crate::core::{AssemblyState, State, StateHistory, StateTransition, StateUpdate};
use crate::device::SharedDevice;
use crate::error::AssemblyError;
use crate::executors::{
    self, spawn_follow, ExecutionContext, FollowHandle, FollowSolution, Report, ReportSink,
    Reporter, RunId, RunningExecutor, Settlement,
};
use crate::status::CommandStatus;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod transition;

pub use transition::{
    transition, validate_external_update, ActiveCommand, Dispatch, Effect, Event, Mode, Slot, Step,
    Ticket,
};

/// Capacity of the follow telemetry broadcast; slow observers lag.
pub const FOLLOW_TELEMETRY_CAPACITY: usize = 64;

/// Number of state changes kept in the history.
pub const HISTORY_LIMIT: usize = 256;

enum Inbound {
    Submit {
        request: CommandRequest,
        reply: Option<oneshot::Sender<CommandStatus>>,
    },
    Event(Event),
    UpdateState {
        update: StateUpdate,
        ack: oneshot::Sender<Result<AssemblyState, AssemblyError>>,
    },
    History(oneshot::Sender<StateHistory<AssemblyState>>),
    Shutdown(oneshot::Sender<()>),
}

/// The eventual status of a submitted command.
#[must_use = "a pending status does nothing unless awaited"]
pub struct PendingStatus {
    rx: oneshot::Receiver<CommandStatus>,
}

impl PendingStatus {
    pub async fn wait(self) -> Result<CommandStatus, AssemblyError> {
        self.rx.await.map_err(|_| AssemblyError::NotRunning)
    }
}

/// Handle to a running assembly.
///
/// Dropping the handle shuts the dispatcher down; pending commands are
/// answered `Cancelled`.
pub struct Assembly {
    inbox: mpsc::UnboundedSender<Inbound>,
    state: watch::Receiver<AssemblyState>,
    follow: broadcast::Sender<FollowSolution>,
    commands: Commands,
    task: Option<JoinHandle<()>>,
}

impl Assembly {
    /// Validate `config` and start the dispatcher. Must be called inside a
    /// tokio runtime.
    pub fn spawn(config: AssemblyConfig, device: SharedDevice) -> Result<Self, AssemblyError> {
        config.validate()?;
        let config = Arc::new(config);
        let commands = Commands::new(config.component_prefix.clone());

        let (inbox, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(AssemblyState::default());
        let (follow, _) = broadcast::channel(FOLLOW_TELEMETRY_CAPACITY);

        let dispatcher = Dispatcher {
            config,
            commands: commands.clone(),
            device,
            inbox: inbox.clone(),
            dispatch: Dispatch::default(),
            state: AssemblyState::default(),
            state_tx,
            history: StateHistory::with_limit(HISTORY_LIMIT),
            replies: HashMap::new(),
            executors: HashMap::new(),
            follow: None,
            follow_tx: follow.clone(),
            next_ticket: 0,
        };
        info!(prefix = %commands.component_prefix(), "assembly started");
        let task = tokio::spawn(dispatcher.run(rx));

        Ok(Self {
            inbox,
            state,
            follow,
            commands,
            task: Some(task),
        })
    }

    /// Request builder bound to this assembly's prefix.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Submit a command; its status arrives on the returned handle.
    pub fn submit(&self, request: CommandRequest) -> PendingStatus {
        let (tx, rx) = oneshot::channel();
        // If the dispatcher is gone the sender is dropped and `wait` fails.
        let _ = self.inbox.send(Inbound::Submit {
            request,
            reply: Some(tx),
        });
        PendingStatus { rx }
    }

    /// Submit a command without a reply destination.
    pub fn tell(&self, request: CommandRequest) -> Result<(), AssemblyError> {
        self.send(Inbound::Submit {
            request,
            reply: None,
        })
    }

    /// Submit a command and wait for its status.
    pub async fn execute(&self, request: CommandRequest) -> Result<CommandStatus, AssemblyError> {
        self.submit(request).wait().await
    }

    /// Apply an external state change, e.g. the sodium layer becoming ready.
    ///
    /// Returns the resulting state, or [`AssemblyError::StateRejected`] if
    /// the change conflicts with the current mode.
    pub async fn update_state(&self, update: StateUpdate) -> Result<AssemblyState, AssemblyError> {
        let (ack, rx) = oneshot::channel();
        self.send(Inbound::UpdateState { update, ack })?;
        rx.await.map_err(|_| AssemblyError::NotRunning)?
    }

    /// Feed a focus error (µm) to the follow loop. Ignored unless following.
    pub fn update_focus_error(&self, focus_error: f64) -> Result<(), AssemblyError> {
        self.send(Inbound::Event(Event::FocusError(focus_error)))
    }

    pub fn current_state(&self) -> AssemblyState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AssemblyState> {
        self.state.clone()
    }

    pub async fn history(&self) -> Result<StateHistory<AssemblyState>, AssemblyError> {
        let (tx, rx) = oneshot::channel();
        self.send(Inbound::History(tx))?;
        rx.await.map_err(|_| AssemblyError::NotRunning)
    }

    /// Solutions computed by the follow loop.
    pub fn subscribe_follow(&self) -> broadcast::Receiver<FollowSolution> {
        self.follow.subscribe()
    }

    /// Stop all work and wait for the dispatcher to exit.
    pub async fn shutdown(mut self) -> Result<(), AssemblyError> {
        let (tx, rx) = oneshot::channel();
        self.send(Inbound::Shutdown(tx))?;
        rx.await.map_err(|_| AssemblyError::NotRunning)?;
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| AssemblyError::NotRunning)?;
        }
        Ok(())
    }

    fn send(&self, message: Inbound) -> Result<(), AssemblyError> {
        self.inbox
            .send(message)
            .map_err(|_| AssemblyError::NotRunning)
    }
}

impl Drop for Assembly {
    fn drop(&mut self) {
        if self.task.is_some() {
            let (tx, _) = oneshot::channel();
            let _ = self.inbox.send(Inbound::Shutdown(tx));
        }
    }
}

struct Dispatcher {
    config: Arc<AssemblyConfig>,
    commands: Commands,
    device: SharedDevice,
    inbox: mpsc::UnboundedSender<Inbound>,
    dispatch: Dispatch,
    state: AssemblyState,
    state_tx: watch::Sender<AssemblyState>,
    history: StateHistory<AssemblyState>,
    replies: HashMap<Ticket, oneshot::Sender<CommandStatus>>,
    executors: HashMap<RunId, RunningExecutor>,
    follow: Option<FollowHandle>,
    follow_tx: broadcast::Sender<FollowSolution>,
    next_ticket: u64,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(message) = rx.recv().await {
            match message {
                Inbound::Submit { request, reply } => {
                    let ticket = self.issue_ticket(reply);
                    info!(%ticket, prefix = %request.prefix, "command received");
                    self.handle(Event::Submit {
                        ticket,
                        run: RunId::new(),
                        request,
                    });
                }
                Inbound::Event(event) => self.handle(event),
                Inbound::UpdateState { update, ack } => {
                    let _ = ack.send(self.external_update(update));
                }
                Inbound::History(reply) => {
                    let _ = reply.send(self.history.clone());
                }
                Inbound::Shutdown(done) => {
                    self.shutdown();
                    let _ = done.send(());
                    break;
                }
            }
        }
        info!("assembly stopped");
    }

    fn issue_ticket(&mut self, reply: Option<oneshot::Sender<CommandStatus>>) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        if let Some(reply) = reply {
            self.replies.insert(ticket, reply);
        }
        ticket
    }

    fn handle(&mut self, event: Event) {
        if let Event::Report(Report::Finished { run, .. }) = &event {
            self.executors.remove(run);
        }
        let step = transition(&self.dispatch, &self.state, &self.commands, event);
        if step.next.mode != self.dispatch.mode {
            debug!(from = %self.dispatch.mode, to = %step.next.mode, "mode changed");
        }
        self.dispatch = step.next;
        for effect in step.effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Reply { ticket, status } => self.reply(ticket, status),
            Effect::SetState { update, cause } => self.set_state(update, cause),
            Effect::Spawn { run, key, request } => {
                let reporter = Reporter::new(run, self.report_sink());
                let executor = executors::spawn(key, request, self.context(), reporter);
                self.executors.insert(run, executor);
            }
            Effect::StopExecutor { run, tickets } => {
                let replies: Vec<_> = tickets
                    .iter()
                    .filter_map(|ticket| self.replies.remove(ticket))
                    .collect();
                let teardown = self.config.timing.teardown_timeout();
                let handle = self.executors.remove(&run).map(RunningExecutor::stop);
                tokio::spawn(async move {
                    if let Some(handle) = handle {
                        reap(handle, teardown).await;
                    }
                    for reply in replies {
                        let _ = reply.send(CommandStatus::Cancelled);
                    }
                });
            }
            Effect::StartFollowing {
                run,
                nss_in_use,
                elevation,
            } => {
                self.follow = Some(spawn_follow(
                    run,
                    nss_in_use,
                    elevation,
                    self.context(),
                    self.follow_tx.clone(),
                ));
            }
            Effect::Forward { update } => match &self.follow {
                Some(follow) => follow.update(update),
                None => warn!(?update, "no follow loop to forward to"),
            },
            Effect::Settle { ticket, update } => {
                let settle = self
                    .follow
                    .as_ref()
                    .map(|follow| follow.settle(update, &self.context()));
                match settle {
                    Some(settle) => {
                        let inbox = self.inbox.clone();
                        tokio::spawn(async move {
                            let settlement = settle.await;
                            let _ = inbox.send(Inbound::Event(Event::Settled {
                                ticket,
                                update,
                                settlement,
                            }));
                        });
                    }
                    None => self.handle(Event::Settled {
                        ticket,
                        update,
                        settlement: Settlement::rejected("follow loop is not running"),
                    }),
                }
            }
            Effect::StopFollowing => {
                if let Some(follow) = self.follow.take() {
                    let teardown = self.config.timing.teardown_timeout();
                    let handle = follow.stop();
                    tokio::spawn(reap(handle, teardown));
                }
            }
            Effect::Ignore { reason } => warn!(%reason, "ignored message"),
        }
    }

    fn reply(&mut self, ticket: Ticket, status: CommandStatus) {
        if status.is_rejection() {
            warn!(%ticket, %status, "command rejected");
        } else {
            info!(%ticket, %status, "command finished");
        }
        match self.replies.remove(&ticket) {
            Some(reply) => {
                let _ = reply.send(status);
            }
            None => debug!(%ticket, "no reply destination"),
        }
    }

    fn set_state(&mut self, update: StateUpdate, cause: String) {
        let next = self.state.apply(&update);
        if next == self.state {
            return;
        }
        info!(from = %self.state.summary(), to = %next.summary(), %cause, "assembly state changed");
        self.history = self.history.record(StateTransition {
            from: self.state,
            to: next,
            timestamp: Utc::now(),
            cause,
        });
        self.state = next;
        self.state_tx.send_replace(next);
    }

    fn external_update(&mut self, update: StateUpdate) -> Result<AssemblyState, AssemblyError> {
        validate_external_update(&self.dispatch, &self.state, &update).map_err(|reason| {
            warn!(%reason, "external state update rejected");
            AssemblyError::StateRejected(reason)
        })?;
        self.set_state(update, "external".to_string());
        Ok(self.state)
    }

    fn report_sink(&self) -> ReportSink {
        let inbox = self.inbox.clone();
        Arc::new(move |report| {
            let _ = inbox.send(Inbound::Event(Event::Report(report)));
        })
    }

    fn context(&self) -> ExecutionContext {
        ExecutionContext {
            config: Arc::clone(&self.config),
            device: Arc::clone(&self.device),
            state: self.state_tx.subscribe(),
        }
    }

    fn shutdown(&mut self) {
        for (_, executor) in self.executors.drain() {
            drop(executor.stop());
        }
        if let Some(follow) = self.follow.take() {
            follow.abort();
        }
        for (_, reply) in self.replies.drain() {
            let _ = reply.send(CommandStatus::Cancelled);
        }
    }
}

/// Wait for a stopped task, aborting it after `teardown`.
async fn reap(mut handle: JoinHandle<()>, teardown: Duration) {
    if tokio::time::timeout(teardown, &mut handle).await.is_err() {
        warn!(?teardown, "task did not stop in time, aborting");
        handle.abort();
    }
}
