//! Typed, unit-tagged parameters and ordered parameter sets.
//!
//! Command requests and device telemetry both carry their data as a
//! [`ParameterSet`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameter keys shared by commands and device telemetry.
pub mod keys {
    pub const STAGE_POSITION: &str = "stagePosition";
    pub const RANGE_DISTANCE: &str = "rangeDistance";
    pub const ELEVATION: &str = "elevation";
    pub const ZENITH_ANGLE: &str = "zenithAngle";
    pub const NSS_IN_USE: &str = "nssInUse";
    pub const FOCUS: &str = "focus";

    pub const AXIS_STATE: &str = "axisState";
    pub const POSITION: &str = "position";
    pub const IN_LOW_LIMIT: &str = "inLowLimit";
    pub const IN_HIGH_LIMIT: &str = "inHighLimit";
    pub const IN_HOME: &str = "inHome";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Units {
    NoUnits,
    Millimeters,
    Kilometers,
    Micrometers,
    Degrees,
    EncoderCounts,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Units::NoUnits => "none",
            Units::Millimeters => "mm",
            Units::Kilometers => "km",
            Units::Micrometers => "um",
            Units::Degrees => "deg",
            Units::EncoderCounts => "enc",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ParamValue {
    Double(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Double(_) => "double",
            ParamValue::Int(_) => "int",
            ParamValue::Bool(_) => "bool",
            ParamValue::Text(_) => "text",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Double(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: ParamValue,
    pub units: Units,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: ParamValue, units: Units) -> Self {
        Self {
            key: key.into(),
            value,
            units,
        }
    }

    pub fn double(key: impl Into<String>, value: f64, units: Units) -> Self {
        Self::new(key, ParamValue::Double(value), units)
    }

    pub fn int(key: impl Into<String>, value: i64, units: Units) -> Self {
        Self::new(key, ParamValue::Int(value), units)
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, ParamValue::Bool(value), Units::NoUnits)
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, ParamValue::Text(value.into()), Units::NoUnits)
    }
}

/// Parameters in insertion order, at most one per key.
///
/// Adding a parameter whose key is already present replaces the old value
/// in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter (builder style).
    pub fn with(mut self, param: Parameter) -> Self {
        self.insert(param);
        self
    }

    pub fn insert(&mut self, param: Parameter) {
        match self.params.iter_mut().find(|p| p.key == param.key) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<Parameter> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for param in iter {
            set.insert(param);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_replaces_duplicates() {
        let set = ParameterSet::new()
            .with(Parameter::double(keys::ELEVATION, 95.0, Units::Kilometers))
            .with(Parameter::bool(keys::NSS_IN_USE, false))
            .with(Parameter::double(keys::ELEVATION, 100.0, Units::Kilometers));

        let found: Vec<&str> = set.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(found, vec![keys::ELEVATION, keys::NSS_IN_USE]);
        assert_eq!(
            set.get(keys::ELEVATION).and_then(|p| p.value.as_f64()),
            Some(100.0)
        );
    }

    #[test]
    fn accessors_check_the_variant() {
        let value = ParamValue::Int(3);
        assert_eq!(value.as_i64(), Some(3));
        assert_eq!(value.as_f64(), None);
        assert_eq!(value.type_name(), "int");
    }

    #[test]
    fn parameter_set_serializes_as_list() {
        let set = ParameterSet::new().with(Parameter::bool(keys::NSS_IN_USE, true));
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(
            json,
            r#"[{"key":"nssInUse","value":{"type":"bool","value":true},"units":"noUnits"}]"#
        );

        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
