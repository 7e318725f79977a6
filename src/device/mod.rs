//! The device (HCD) boundary: commands in, telemetry out.
//!
//! The assembly never talks to hardware directly. It submits
//! [`DeviceCommand`]s fire-and-forget and watches a [`TelemetryStream`] of
//! axis snapshots. [`SimulatedAxis`] implements the boundary in-process.

use crate::params::{keys, ParamValue, Parameter, ParameterSet, Units};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

mod simulator;

pub use simulator::{AxisConfig, SimulatedAxis};

/// Prefix under which the axis publishes its current state.
pub const AXIS_STATE_PREFIX: &str = "NFIRAOS.ncc.tromboneHCD.axis1State";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisState {
    Idle,
    Moving,
    Error,
}

impl AxisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisState::Idle => "AXIS_IDLE",
            AxisState::Moving => "AXIS_MOVING",
            AxisState::Error => "AXIS_ERROR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AXIS_IDLE" => Some(AxisState::Idle),
            "AXIS_MOVING" => Some(AxisState::Moving),
            "AXIS_ERROR" => Some(AxisState::Error),
            _ => None,
        }
    }

    pub fn parameter(&self) -> Parameter {
        Parameter::text(keys::AXIS_STATE, self.as_str())
    }
}

/// Commands the assembly sends to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum DeviceCommand {
    Datum,
    Position { encoder: i64 },
    Cancel,
}

/// A snapshot the device published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub prefix: String,
    pub params: ParameterSet,
}

impl CurrentState {
    pub fn new(prefix: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            prefix: prefix.into(),
            params,
        }
    }

    /// Axis snapshot under [`AXIS_STATE_PREFIX`].
    pub fn axis(state: AxisState, position: i64) -> Self {
        Self::new(
            AXIS_STATE_PREFIX,
            ParameterSet::new()
                .with(state.parameter())
                .with(Parameter::int(keys::POSITION, position, Units::EncoderCounts)),
        )
    }

    pub fn axis_state(&self) -> Option<AxisState> {
        self.params
            .get(keys::AXIS_STATE)
            .and_then(|p| p.value.as_text())
            .and_then(AxisState::from_name)
    }

    pub fn position(&self) -> Option<i64> {
        self.params.get(keys::POSITION).and_then(|p| p.value.as_i64())
    }

    fn flag(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(|p| p.value.as_bool())
            .unwrap_or(false)
    }

    pub fn in_low_limit(&self) -> bool {
        self.flag(keys::IN_LOW_LIMIT)
    }

    pub fn in_high_limit(&self) -> bool {
        self.flag(keys::IN_HIGH_LIMIT)
    }

    pub fn in_home(&self) -> bool {
        self.flag(keys::IN_HOME)
    }
}

/// The values a command expects the device to reach.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemandState {
    pub prefix: String,
    pub params: ParameterSet,
}

impl DemandState {
    pub fn new(prefix: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            prefix: prefix.into(),
            params,
        }
    }

    /// The axis is idle, wherever it is.
    pub fn axis_idle() -> Self {
        Self::new(
            AXIS_STATE_PREFIX,
            ParameterSet::new().with(AxisState::Idle.parameter()),
        )
    }

    /// The axis is idle at `encoder`.
    pub fn axis_at(encoder: i64) -> Self {
        Self::new(
            AXIS_STATE_PREFIX,
            ParameterSet::new()
                .with(AxisState::Idle.parameter())
                .with(Parameter::int(keys::POSITION, encoder, Units::EncoderCounts)),
        )
    }

    pub fn demanded(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key).map(|p| &p.value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Telemetry {
    Snapshot(CurrentState),
    /// The device reported a failure; matchers resolve with an error.
    Fault(String),
}

pub type TelemetryStream = mpsc::UnboundedReceiver<Telemetry>;

/// Connection to the device. Shared read-only by the dispatcher and every
/// executor.
pub trait DeviceConnection: Send + Sync {
    /// Fire-and-forget.
    fn submit(&self, command: DeviceCommand);

    /// A stream of every telemetry event published after this call.
    fn subscribe(&self) -> TelemetryStream;
}

pub type SharedDevice = Arc<dyn DeviceConnection>;

/// Fan-out of telemetry to any number of subscribers.
///
/// Each subscriber gets its own unbounded queue, so no snapshot is lost to
/// a slow reader. Closed subscribers are pruned on the next publish.
#[derive(Default)]
pub struct TelemetryHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Telemetry>>>,
}

impl TelemetryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> TelemetryStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: Telemetry) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<Telemetry>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
