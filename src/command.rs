//! Command requests, the closed set of command keys and parameter
//! validation.
//!
//! A request is addressed as `<componentPrefix>.<key>`. [`Commands`] builds
//! well-formed requests for one assembly and resolves incoming prefixes back
//! to a [`CommandKey`].

use crate::params::{keys, ParamValue, Parameter, ParameterSet, Units};
use crate::status::Issue;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKey {
    Init,
    Datum,
    Stop,
    Move,
    Position,
    SetElevation,
    SetAngle,
    Follow,
}

impl CommandKey {
    pub const ALL: [CommandKey; 8] = [
        CommandKey::Init,
        CommandKey::Datum,
        CommandKey::Stop,
        CommandKey::Move,
        CommandKey::Position,
        CommandKey::SetElevation,
        CommandKey::SetAngle,
        CommandKey::Follow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKey::Init => "init",
            CommandKey::Datum => "datum",
            CommandKey::Stop => "stop",
            CommandKey::Move => "move",
            CommandKey::Position => "position",
            CommandKey::SetElevation => "setElevation",
            CommandKey::SetAngle => "setAngle",
            CommandKey::Follow => "follow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    /// Commands that run a motion executor.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            CommandKey::Datum | CommandKey::Move | CommandKey::Position | CommandKey::SetElevation
        )
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command as submitted by a caller. Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub prefix: String,
    pub params: ParameterSet,
}

impl CommandRequest {
    pub fn new(prefix: impl Into<String>, params: ParameterSet) -> Self {
        Self {
            prefix: prefix.into(),
            params,
        }
    }

    pub fn with(mut self, param: Parameter) -> Self {
        self.params.insert(param);
        self
    }
}

/// Builds requests for one assembly and maps prefixes back to keys.
///
/// ```rust
/// use trombone::command::{CommandKey, Commands};
///
/// let commands = Commands::new("NFIRAOS.cc.lgsTrombone");
/// let request = commands.move_to(10.0);
///
/// assert_eq!(request.prefix, "NFIRAOS.cc.lgsTrombone.move");
/// assert_eq!(commands.resolve(&request), Some(CommandKey::Move));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commands {
    component_prefix: String,
}

impl Commands {
    pub fn new(component_prefix: impl Into<String>) -> Self {
        Self {
            component_prefix: component_prefix.into(),
        }
    }

    pub fn component_prefix(&self) -> &str {
        &self.component_prefix
    }

    pub fn prefix_of(&self, key: CommandKey) -> String {
        format!("{}.{}", self.component_prefix, key.as_str())
    }

    pub fn request(&self, key: CommandKey) -> CommandRequest {
        CommandRequest::new(self.prefix_of(key), ParameterSet::new())
    }

    /// The key a request addresses, if it belongs to this assembly.
    pub fn resolve(&self, request: &CommandRequest) -> Option<CommandKey> {
        request
            .prefix
            .strip_prefix(self.component_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(CommandKey::from_name)
    }

    pub fn init(&self) -> CommandRequest {
        self.request(CommandKey::Init)
    }

    pub fn datum(&self) -> CommandRequest {
        self.request(CommandKey::Datum)
    }

    pub fn stop(&self) -> CommandRequest {
        self.request(CommandKey::Stop)
    }

    pub fn move_to(&self, stage_position_mm: f64) -> CommandRequest {
        self.request(CommandKey::Move).with(Parameter::double(
            keys::STAGE_POSITION,
            stage_position_mm,
            Units::Millimeters,
        ))
    }

    pub fn position(&self, range_distance_km: f64) -> CommandRequest {
        self.request(CommandKey::Position).with(Parameter::double(
            keys::RANGE_DISTANCE,
            range_distance_km,
            Units::Kilometers,
        ))
    }

    pub fn set_elevation(&self, elevation_km: f64) -> CommandRequest {
        self.request(CommandKey::SetElevation).with(Parameter::double(
            keys::ELEVATION,
            elevation_km,
            Units::Kilometers,
        ))
    }

    pub fn set_angle(&self, zenith_angle_deg: f64) -> CommandRequest {
        self.request(CommandKey::SetAngle).with(Parameter::double(
            keys::ZENITH_ANGLE,
            zenith_angle_deg,
            Units::Degrees,
        ))
    }

    pub fn follow(&self, nss_in_use: bool) -> CommandRequest {
        self.request(CommandKey::Follow)
            .with(Parameter::bool(keys::NSS_IN_USE, nss_in_use))
    }
}

/// Read a required `Double` parameter in the given units.
pub fn double_param(params: &ParameterSet, key: &str, units: Units) -> Result<f64, Issue> {
    let param = params.get(key).ok_or_else(|| Issue::MissingKey {
        key: key.to_string(),
    })?;
    let value = match param.value {
        ParamValue::Double(value) => value,
        ref other => {
            return Err(Issue::WrongParameterType {
                key: key.to_string(),
                expected: "double".to_string(),
                found: other.type_name().to_string(),
            })
        }
    };
    if param.units != units {
        return Err(Issue::WrongUnits {
            key: key.to_string(),
            expected: units,
            found: param.units,
        });
    }
    if !value.is_finite() {
        return Err(Issue::OutOfRange {
            key: key.to_string(),
            message: format!("{value} is not finite"),
        });
    }
    Ok(value)
}

/// Read a required `Bool` parameter.
pub fn bool_param(params: &ParameterSet, key: &str) -> Result<bool, Issue> {
    let param = params.get(key).ok_or_else(|| Issue::MissingKey {
        key: key.to_string(),
    })?;
    param.value.as_bool().ok_or_else(|| Issue::WrongParameterType {
        key: key.to_string(),
        expected: "bool".to_string(),
        found: param.value.type_name().to_string(),
    })
}

/// Check that a request carries the parameters its key needs.
pub fn validate(key: CommandKey, request: &CommandRequest) -> Result<(), Issue> {
    let params = &request.params;
    match key {
        CommandKey::Init | CommandKey::Datum | CommandKey::Stop => Ok(()),
        CommandKey::Move => {
            double_param(params, keys::STAGE_POSITION, Units::Millimeters).map(|_| ())
        }
        CommandKey::Position => {
            double_param(params, keys::RANGE_DISTANCE, Units::Kilometers).map(|_| ())
        }
        CommandKey::SetElevation => {
            double_param(params, keys::ELEVATION, Units::Kilometers).map(|_| ())
        }
        CommandKey::SetAngle => {
            let angle = double_param(params, keys::ZENITH_ANGLE, Units::Degrees)?;
            if (0.0..90.0).contains(&angle) {
                Ok(())
            } else {
                Err(Issue::OutOfRange {
                    key: keys::ZENITH_ANGLE.to_string(),
                    message: format!("{angle} deg must be in [0, 90)"),
                })
            }
        }
        CommandKey::Follow => bool_param(params, keys::NSS_IN_USE).map(|_| ()),
    }
}
