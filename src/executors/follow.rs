//! The follow loop.
//!
//! While the assembly is following, one task tracks the sodium layer: every
//! zenith-angle, elevation or focus-error update recomputes the
//! focus-compensated range distance and drives the axis there.

use super::{ExecutionContext, RunId};
use crate::algorithms::{
    focus_zenith_angle_to_range_distance, range_distance_to_elevation,
    range_distance_to_stage_position, stage_position_to_encoder, ConversionError,
};
use crate::device::DeviceCommand;
use crate::matcher::{wait_for_match, DemandMatcher};
use crate::status::CommandStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// An input to the follow loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum FollowUpdate {
    /// Degrees, `0 <= za < 90`.
    ZenithAngle(f64),
    /// Kilometers.
    Elevation(f64),
    /// Micrometers.
    FocusError(f64),
}

/// One computed demand, published for observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowSolution {
    pub run: RunId,
    pub elevation: f64,
    /// The angle used, which is 0 while NSS is in use.
    pub zenith_angle: f64,
    pub focus_error: f64,
    pub range_distance: f64,
    /// Elevation seen along the zenith angle at the compensated range.
    pub compensated_elevation: f64,
    pub stage_position: f64,
    pub encoder: i64,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of an update forwarded with [`FollowHandle::settle`].
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    /// False when the update was rejected; the loop kept its previous inputs
    /// and nothing was submitted.
    pub applied: bool,
    pub status: CommandStatus,
}

impl Settlement {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            applied: false,
            status: CommandStatus::error(message),
        }
    }
}

type Ack = oneshot::Sender<Result<FollowSolution, ConversionError>>;

enum FollowInput {
    Update { update: FollowUpdate, ack: Option<Ack> },
    Stop,
}

#[derive(Clone, Copy, Debug)]
struct Inputs {
    elevation: f64,
    zenith_angle: f64,
    focus_error: f64,
    nss_in_use: bool,
}

impl Inputs {
    fn apply(&mut self, update: FollowUpdate) {
        match update {
            FollowUpdate::ZenithAngle(za) => self.zenith_angle = za,
            FollowUpdate::Elevation(el) => self.elevation = el,
            FollowUpdate::FocusError(fe) => self.focus_error = fe,
        }
    }

    fn solve(&self, run: RunId, ctx: &ExecutionContext) -> Result<FollowSolution, ConversionError> {
        let calc = &ctx.config.calculation;
        let control = &ctx.config.control;
        let zenith_angle = if self.nss_in_use { 0.0 } else { self.zenith_angle };

        let range_distance =
            focus_zenith_angle_to_range_distance(
                calc,
                self.elevation,
                self.focus_error,
                zenith_angle,
            )?;
        let compensated_elevation = range_distance_to_elevation(range_distance, zenith_angle)?;
        let stage_position = range_distance_to_stage_position(control, range_distance);
        let encoder = stage_position_to_encoder(control, stage_position)?;

        Ok(FollowSolution {
            run,
            elevation: self.elevation,
            zenith_angle,
            focus_error: self.focus_error,
            range_distance,
            compensated_elevation,
            stage_position,
            encoder,
            timestamp: Utc::now(),
        })
    }
}

/// Handle to a running follow loop, owned by the dispatcher.
pub struct FollowHandle {
    run: RunId,
    inbox: mpsc::UnboundedSender<FollowInput>,
    task: JoinHandle<()>,
}

impl FollowHandle {
    /// Send an update without waiting for its result.
    pub fn update(&self, update: FollowUpdate) {
        self.send(FollowInput::Update { update, ack: None });
    }

    /// Send an update; the receiver yields the resulting solution.
    pub fn update_with_ack(
        &self,
        update: FollowUpdate,
    ) -> oneshot::Receiver<Result<FollowSolution, ConversionError>> {
        let (tx, rx) = oneshot::channel();
        self.send(FollowInput::Update {
            update,
            ack: Some(tx),
        });
        rx
    }

    /// Apply an update and wait for the axis to settle.
    ///
    /// The telemetry subscription is taken before the update is sent. The
    /// returned future does not borrow the handle.
    pub fn settle(
        &self,
        update: FollowUpdate,
        ctx: &ExecutionContext,
    ) -> impl std::future::Future<Output = Settlement> + Send + 'static {
        let stream = ctx.device.subscribe();
        let ack = self.update_with_ack(update);
        let timeout = ctx.config.timing.match_timeout();
        async move {
            match ack.await {
                Ok(Ok(_)) => Settlement {
                    applied: true,
                    status: wait_for_match(stream, &DemandMatcher::idle(), timeout).await,
                },
                Ok(Err(err)) => Settlement::rejected(err.to_string()),
                Err(_) => Settlement::rejected("follow stopped before the update was applied"),
            }
        }
    }

    /// Tell the loop to exit; the handle completes when it has.
    pub fn stop(self) -> JoinHandle<()> {
        self.send(FollowInput::Stop);
        self.task
    }

    pub fn abort(self) {
        self.task.abort();
    }

    fn send(&self, input: FollowInput) {
        if self.inbox.send(input).is_err() {
            warn!(run = %self.run, "follow loop is no longer running");
        }
    }
}

/// Start following.
///
/// Without an `elevation` the configured default initial elevation is used.
/// The initial demand is submitted immediately.
pub fn spawn_follow(
    run: RunId,
    nss_in_use: bool,
    elevation: Option<f64>,
    ctx: ExecutionContext,
    telemetry: broadcast::Sender<FollowSolution>,
) -> FollowHandle {
    let (inbox, mut rx) = mpsc::unbounded_channel();
    let inputs = Inputs {
        elevation: elevation.unwrap_or(ctx.config.calculation.default_initial_elevation),
        zenith_angle: 0.0,
        focus_error: 0.0,
        nss_in_use,
    };
    let span = tracing::info_span!("follow", %run, nss_in_use);

    let task = tokio::spawn(
        async move {
            let mut inputs = inputs;
            info!(elevation = inputs.elevation, "following started");
            if let Err(err) = drive(run, &inputs, &ctx, &telemetry) {
                warn!(%err, "initial follow demand rejected");
            }

            while let Some(input) = rx.recv().await {
                match input {
                    FollowInput::Update { update, ack } => {
                        let mut candidate = inputs;
                        candidate.apply(update);
                        let result = drive(run, &candidate, &ctx, &telemetry);
                        match &result {
                            Ok(_) => inputs = candidate,
                            Err(err) => {
                                warn!(
                                    ?update,
                                    %err,
                                    "follow demand rejected, keeping previous inputs"
                                )
                            }
                        }
                        if let Some(ack) = ack {
                            let _ = ack.send(result);
                        }
                    }
                    FollowInput::Stop => break,
                }
            }
            info!("following stopped");
        }
        .instrument(span),
    );

    FollowHandle { run, inbox, task }
}

fn drive(
    run: RunId,
    inputs: &Inputs,
    ctx: &ExecutionContext,
    telemetry: &broadcast::Sender<FollowSolution>,
) -> Result<FollowSolution, ConversionError> {
    let solution = inputs.solve(run, ctx)?;
    ctx.device.submit(DeviceCommand::Position {
        encoder: solution.encoder,
    });
    debug!(encoder = solution.encoder, range = solution.range_distance, "follow demand submitted");
    // No subscribers is fine.
    let _ = telemetry.send(solution.clone());
    Ok(solution)
}
