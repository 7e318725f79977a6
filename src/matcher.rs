//! Waiting for the device to reach a demanded state.
//!
//! A matcher is a pure predicate over [`CurrentState`] snapshots.
//! [`wait_for_match`] drives one against a live [`TelemetryStream`] with a
//! timeout and resolves to exactly one [`CommandStatus`].
//!
//! The stream must be subscribed *before* the demand is submitted, otherwise
//! the matching snapshot may already have been published.

use crate::device::{CurrentState, DemandState, Telemetry, TelemetryStream};
use crate::status::CommandStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

pub const TIMEOUT_MESSAGE: &str = "timeout";
pub const STREAM_CLOSED_MESSAGE: &str = "telemetry stream closed";

pub trait Matcher: Send + Sync {
    /// Only snapshots with this prefix are checked.
    fn prefix(&self) -> &str;

    fn check(&self, current: &CurrentState) -> bool;
}

/// Matches when every demanded item equals the current value.
#[derive(Clone, Debug)]
pub struct DemandMatcher {
    demand: DemandState,
    with_units: bool,
}

impl DemandMatcher {
    pub fn new(demand: DemandState) -> Self {
        Self {
            demand,
            with_units: false,
        }
    }

    /// Compare units as well as values.
    pub fn with_units(mut self) -> Self {
        self.with_units = true;
        self
    }

    /// Axis idle at any position.
    pub fn idle() -> Self {
        Self::new(DemandState::axis_idle())
    }

    /// Axis idle at `encoder`.
    pub fn position(encoder: i64) -> Self {
        Self::new(DemandState::axis_at(encoder))
    }

    pub fn demand(&self) -> &DemandState {
        &self.demand
    }
}

impl Matcher for DemandMatcher {
    fn prefix(&self) -> &str {
        &self.demand.prefix
    }

    fn check(&self, current: &CurrentState) -> bool {
        self.demand.params.iter().all(|demanded| {
            current.params.get(&demanded.key).is_some_and(|found| {
                found.value == demanded.value && (!self.with_units || found.units == demanded.units)
            })
        })
    }
}

/// Matches with an arbitrary predicate.
pub struct PredicateMatcher {
    prefix: String,
    predicate: Box<dyn Fn(&CurrentState) -> bool + Send + Sync>,
}

impl PredicateMatcher {
    pub fn new<F>(prefix: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CurrentState) -> bool + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl Matcher for PredicateMatcher {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn check(&self, current: &CurrentState) -> bool {
        (self.predicate)(current)
    }
}

/// Consume `stream` until `matcher` accepts a snapshot, the device reports a
/// fault, the stream closes or `timeout` elapses.
///
/// Snapshots are checked in arrival order and the first match wins. The
/// stream is dropped when this returns.
pub async fn wait_for_match(
    mut stream: TelemetryStream,
    matcher: &dyn Matcher,
    timeout: Duration,
) -> CommandStatus {
    let deadline = Instant::now() + timeout;
    let expired = tokio::time::sleep_until(deadline);
    tokio::pin!(expired);

    loop {
        // A backlog of snapshots must not hold off the deadline.
        if Instant::now() >= deadline {
            return timed_out(timeout);
        }
        tokio::select! {
            biased;
            _ = &mut expired => return timed_out(timeout),
            event = stream.recv() => match event {
                Some(Telemetry::Snapshot(current)) => {
                    if current.prefix == matcher.prefix() && matcher.check(&current) {
                        debug!(prefix = %current.prefix, "matched device state");
                        return CommandStatus::Completed;
                    }
                    trace!(?current, "snapshot did not match");
                }
                Some(Telemetry::Fault(message)) => return CommandStatus::error(message),
                None => return CommandStatus::error(STREAM_CLOSED_MESSAGE),
            },
        }
    }
}

fn timed_out(timeout: Duration) -> CommandStatus {
    debug!(?timeout, "match timed out");
    CommandStatus::error(TIMEOUT_MESSAGE)
}

/// A match running in its own task.
///
/// Dropping the handle cancels the match.
pub struct MatchHandle {
    outcome: Option<oneshot::Receiver<CommandStatus>>,
    task: JoinHandle<()>,
}

impl MatchHandle {
    /// Wait for the result. `None` if the match was aborted.
    pub async fn outcome(mut self) -> Option<CommandStatus> {
        match self.outcome.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }

    /// Abandon the match; no result will be produced.
    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for MatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run [`wait_for_match`] in a new task.
pub fn spawn_match(
    stream: TelemetryStream,
    matcher: Arc<dyn Matcher>,
    timeout: Duration,
) -> MatchHandle {
    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let status = wait_for_match(stream, matcher.as_ref(), timeout).await;
        let _ = tx.send(status);
    });
    MatchHandle {
        outcome: Some(rx),
        task,
    }
}
