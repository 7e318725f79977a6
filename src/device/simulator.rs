//! In-process simulation of a single trombone axis.
//!
//! The axis moves toward its target by a fixed number of encoder counts per
//! tick and publishes a snapshot for every command and every tick while
//! moving, then an idle snapshot when it arrives.

use super::{
    AxisState, CurrentState, DeviceCommand, DeviceConnection, Telemetry, TelemetryHub,
    TelemetryStream,
};
use crate::params::{keys, Parameter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AxisConfig {
    pub low_limit: i64,
    pub high_limit: i64,
    pub home_position: i64,
    pub datum_position: i64,
    pub start_position: i64,
    /// Encoder counts travelled per tick.
    pub step: i64,
    pub tick_ms: u64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            low_limit: 100,
            high_limit: 1300,
            home_position: 200,
            datum_position: 300,
            start_position: 350,
            step: 25,
            tick_ms: 10,
        }
    }
}

enum Control {
    Command(DeviceCommand),
    Fault(String),
    Stall(bool),
}

struct Axis {
    config: AxisConfig,
    position: i64,
    target: Option<i64>,
    stalled: bool,
}

impl Axis {
    fn state(&self) -> AxisState {
        if self.target.is_some() {
            AxisState::Moving
        } else {
            AxisState::Idle
        }
    }

    fn snapshot(&self) -> CurrentState {
        let mut snapshot = CurrentState::axis(self.state(), self.position);
        snapshot.params.insert(Parameter::bool(
            keys::IN_LOW_LIMIT,
            self.position <= self.config.low_limit,
        ));
        snapshot.params.insert(Parameter::bool(
            keys::IN_HIGH_LIMIT,
            self.position >= self.config.high_limit,
        ));
        snapshot.params.insert(Parameter::bool(
            keys::IN_HOME,
            self.position == self.config.home_position,
        ));
        snapshot
    }

    fn handle(&mut self, command: DeviceCommand) {
        self.target = match command {
            DeviceCommand::Datum => Some(self.config.datum_position),
            DeviceCommand::Position { encoder } => {
                Some(encoder.clamp(self.config.low_limit, self.config.high_limit))
            }
            DeviceCommand::Cancel => None,
        };
    }

    /// Advance one tick toward the target.
    fn step(&mut self) {
        if let Some(target) = self.target {
            let remaining = target - self.position;
            let delta = remaining.clamp(-self.config.step, self.config.step);
            self.position += delta;
            if self.position == target {
                self.target = None;
            }
        }
    }
}

/// A simulated axis implementing [`DeviceConnection`].
///
/// Must be spawned inside a tokio runtime. Dropping the handle stops the
/// simulation task.
pub struct SimulatedAxis {
    hub: Arc<TelemetryHub>,
    control: mpsc::UnboundedSender<Control>,
    position: Arc<AtomicI64>,
    submitted: Mutex<Vec<DeviceCommand>>,
    task: JoinHandle<()>,
}

impl SimulatedAxis {
    pub fn spawn(config: AxisConfig) -> Arc<Self> {
        let hub = Arc::new(TelemetryHub::new());
        let position = Arc::new(AtomicI64::new(config.start_position));
        let (control, inbox) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, inbox, Arc::clone(&hub), Arc::clone(&position)));

        Arc::new(Self {
            hub,
            control,
            position,
            submitted: Mutex::new(Vec::new()),
            task,
        })
    }

    /// Current encoder position.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Every command submitted so far, in order.
    pub fn submitted(&self) -> Vec<DeviceCommand> {
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a fault report to every subscriber.
    pub fn inject_fault(&self, message: impl Into<String>) {
        self.send(Control::Fault(message.into()));
    }

    /// A stalled axis accepts commands but never moves.
    pub fn set_stalled(&self, stalled: bool) {
        self.send(Control::Stall(stalled));
    }

    fn send(&self, control: Control) {
        if self.control.send(control).is_err() {
            warn!("simulated axis is no longer running");
        }
    }
}

impl DeviceConnection for SimulatedAxis {
    fn submit(&self, command: DeviceCommand) {
        debug!(?command, "simulated axis received command");
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command);
        self.send(Control::Command(command));
    }

    fn subscribe(&self) -> TelemetryStream {
        self.hub.subscribe()
    }
}

impl Drop for SimulatedAxis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    config: AxisConfig,
    mut inbox: mpsc::UnboundedReceiver<Control>,
    hub: Arc<TelemetryHub>,
    position: Arc<AtomicI64>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut axis = Axis {
        position: config.start_position,
        config,
        target: None,
        stalled: false,
    };

    loop {
        let moving = axis.target.is_some() && !axis.stalled;
        tokio::select! {
            control = inbox.recv() => match control {
                Some(Control::Command(command)) => {
                    axis.handle(command);
                    hub.publish(Telemetry::Snapshot(axis.snapshot()));
                    ticker.reset();
                }
                Some(Control::Fault(message)) => hub.publish(Telemetry::Fault(message)),
                Some(Control::Stall(stalled)) => axis.stalled = stalled,
                None => break,
            },
            _ = ticker.tick(), if moving => {
                axis.step();
                position.store(axis.position, Ordering::SeqCst);
                hub.publish(Telemetry::Snapshot(axis.snapshot()));
            }
        }
    }
}
