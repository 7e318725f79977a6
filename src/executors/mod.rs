//! Per-command executors.
//!
//! Each accepted motion command runs in its own task, owned by the
//! dispatcher through a [`RunningExecutor`]. An executor never touches the
//! assembly state directly; it sends [`Report`]s, which the dispatcher
//! applies only while the run is still the active one.

use crate::command::{CommandKey, CommandRequest};
use crate::config::AssemblyConfig;
use crate::core::{AssemblyState, StateUpdate};
use crate::device::{DeviceCommand, SharedDevice};
use crate::matcher::{spawn_match, DemandMatcher};
use crate::status::CommandStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

pub mod datum;
pub mod follow;
pub mod motion;

pub use follow::{spawn_follow, FollowHandle, FollowSolution, FollowUpdate, Settlement};

/// Identity of one executor run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an executor tells the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    StateUpdate { run: RunId, update: StateUpdate },
    /// Always the last report of a run that was not stopped.
    Finished { run: RunId, status: CommandStatus },
}

pub type ReportSink = Arc<dyn Fn(Report) + Send + Sync>;

/// Sends reports tagged with one run's identity.
#[derive(Clone)]
pub struct Reporter {
    run: RunId,
    sink: ReportSink,
}

impl Reporter {
    pub fn new(run: RunId, sink: ReportSink) -> Self {
        Self { run, sink }
    }

    /// A reporter whose reports arrive on a channel.
    pub fn channel(run: RunId) -> (Self, tokio::sync::mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sink: ReportSink = Arc::new(move |report| {
            let _ = tx.send(report);
        });
        (Self::new(run, sink), rx)
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn update_state(&self, update: StateUpdate) {
        (self.sink)(Report::StateUpdate {
            run: self.run,
            update,
        });
    }

    pub fn finish(&self, status: CommandStatus) {
        (self.sink)(Report::Finished {
            run: self.run,
            status,
        });
    }
}

/// What every executor needs from the assembly.
#[derive(Clone)]
pub struct ExecutionContext {
    pub config: Arc<AssemblyConfig>,
    pub device: SharedDevice,
    /// Snapshots of the assembly state, published by the dispatcher.
    pub state: watch::Receiver<AssemblyState>,
}

impl ExecutionContext {
    pub fn snapshot(&self) -> AssemblyState {
        *self.state.borrow()
    }
}

/// A device demand and the state that completes it.
#[derive(Clone, Debug)]
pub struct MotionPlan {
    pub command: DeviceCommand,
    pub matcher: DemandMatcher,
}

/// A spawned executor, owned by the dispatcher.
pub struct RunningExecutor {
    run: RunId,
    key: CommandKey,
    device: SharedDevice,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningExecutor {
    /// Cancel device motion and tell the task to exit.
    ///
    /// The cancel is submitted before this returns, so it reaches the device
    /// ahead of any demand from a later run. The returned handle completes
    /// once the task has exited; the run reports nothing further.
    pub fn stop(self) -> JoinHandle<()> {
        info!(run = %self.run, key = %self.key, "stopping executor");
        self.device.submit(DeviceCommand::Cancel);
        let _ = self.stop.send(());
        self.task
    }
}

/// Spawn the executor for a motion command (`datum`, `move`, `position`,
/// `setElevation`).
pub fn spawn(
    key: CommandKey,
    request: CommandRequest,
    ctx: ExecutionContext,
    reporter: Reporter,
) -> RunningExecutor {
    let run = reporter.run();
    let device = Arc::clone(&ctx.device);
    let (stop_tx, stop_rx) = oneshot::channel();
    let span = tracing::info_span!("executor", %run, %key);

    let task = tokio::spawn(
        async move {
            let outcome = tokio::select! {
                biased;
                _ = stop_rx => None,
                status = execute(key, &request, &ctx, &reporter) => Some(status),
            };
            match outcome {
                Some(status) => {
                    if let CommandStatus::Error { message } = &status {
                        error!(%message, "executor failed");
                    } else {
                        debug!(%status, "executor finished");
                    }
                    reporter.finish(status);
                }
                None => debug!("executor stopped"),
            }
        }
        .instrument(span),
    );

    RunningExecutor {
        run,
        key,
        device,
        stop: stop_tx,
        task,
    }
}

async fn execute(
    key: CommandKey,
    request: &CommandRequest,
    ctx: &ExecutionContext,
    reporter: &Reporter,
) -> CommandStatus {
    if !key.is_motion() {
        return CommandStatus::error(format!("{key} does not run a motion executor"));
    }
    let plan = match key {
        CommandKey::Datum => datum::plan(),
        _ => match motion::plan(key, request, ctx) {
            Ok(plan) => plan,
            Err(status) => return status,
        },
    };
    run_plan(plan, ctx, reporter).await
}

/// Mark the axis busy, submit the demand and wait for the device to reach it.
pub async fn run_plan(
    plan: MotionPlan,
    ctx: &ExecutionContext,
    reporter: &Reporter,
) -> CommandStatus {
    reporter.update_state(StateUpdate::busy_moving());

    let stream = ctx.device.subscribe();
    ctx.device.submit(plan.command);
    debug!(command = ?plan.command, "demand submitted");

    let handle = spawn_match(
        stream,
        Arc::new(plan.matcher),
        ctx.config.timing.match_timeout(),
    );
    let status = handle
        .outcome()
        .await
        .unwrap_or_else(|| CommandStatus::error("match abandoned"));

    if status.is_completed() {
        reporter.update_state(StateUpdate::ready_indexed());
    }
    status
}
