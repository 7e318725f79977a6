//! Assembly configuration.
//!
//! Loaded once from a versioned JSON document and shared read-only (`Arc`)
//! by the dispatcher and every executor. All values have reference defaults,
//! so a document only needs to name what it changes.
//!
//! ```rust
//! use trombone::config::AssemblyConfig;
//!
//! let config = AssemblyConfig::from_json_str(
//!     r#"{ "version": 1, "control": { "positionScale": 10.0 } }"#,
//! ).unwrap();
//!
//! assert_eq!(config.control.position_scale, 10.0);
//! assert_eq!(config.control.stage_zero, 200.0);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

pub mod error;

pub use error::ConfigError;

/// Version identifier for the configuration format
pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_COMPONENT_PREFIX: &str = "NFIRAOS.cc.lgsTrombone";

/// How a range distance (km) maps to a stage position (mm).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RangeConversion {
    /// Stage position equals the range distance.
    Identity,
    /// `scale * (range - zeroRange)`.
    #[serde(rename_all = "camelCase")]
    Linear { scale: f64, zero_range: f64 },
}

impl Default for RangeConversion {
    fn default() -> Self {
        RangeConversion::Linear {
            scale: 1.0,
            zero_range: 90.0,
        }
    }
}

/// Stage and encoder calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlConfig {
    /// Encoder counts per millimeter.
    pub position_scale: f64,
    /// Encoder count of stage position zero.
    pub stage_zero: f64,
    pub min_stage_encoder: i64,
    pub max_stage_encoder: i64,
    pub min_encoder_limit: i64,
    pub max_encoder_limit: i64,
    pub range_conversion: RangeConversion,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            position_scale: 8.0,
            stage_zero: 200.0,
            min_stage_encoder: 225,
            max_stage_encoder: 1175,
            min_encoder_limit: 200,
            max_encoder_limit: 1200,
            range_conversion: RangeConversion::default(),
        }
    }
}

/// Follow-mode calculation constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalculationConfig {
    /// Elevation (km) used when following starts without a prior setElevation.
    pub default_initial_elevation: f64,
    /// Kilometers of range per micrometer of focus error.
    pub focus_error_gain: f64,
    pub upper_focus_limit: f64,
    pub lower_focus_limit: f64,
    pub zenith_factor: f64,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            default_initial_elevation: 95.0,
            focus_error_gain: 0.75,
            upper_focus_limit: 20.0,
            lower_focus_limit: -20.0,
            zenith_factor: 4.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingConfig {
    /// Bound on every wait for the device to reach a demand.
    pub match_timeout_ms: u64,
    /// Bound on joining a stopped executor before it is aborted.
    pub teardown_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            match_timeout_ms: 5000,
            teardown_timeout_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// Complete configuration of one assembly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssemblyConfig {
    pub version: u32,
    /// Commands are addressed as `<componentPrefix>.<key>`.
    pub component_prefix: String,
    pub control: ControlConfig,
    pub calculation: CalculationConfig,
    pub timing: TimingConfig,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            component_prefix: DEFAULT_COMPONENT_PREFIX.to_string(),
            control: ControlConfig::default(),
            calculation: CalculationConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl AssemblyConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AssemblyConfig = serde_json::from_str(json)?;
        if config.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: CONFIG_VERSION,
            });
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value consistency, reporting every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let control = &self.control;
        let calc = &self.calculation;
        let checks = vec![
            check(
                !self.component_prefix.is_empty(),
                "componentPrefix must not be empty",
            ),
            check(
                control.position_scale.is_finite() && control.position_scale > 0.0,
                "control.positionScale must be positive",
            ),
            check(
                control.stage_zero.is_finite(),
                "control.stageZero must be finite",
            ),
            check(
                control.min_encoder_limit < control.max_encoder_limit,
                "control.minEncoderLimit must be below maxEncoderLimit",
            ),
            check(
                control.min_stage_encoder <= control.max_stage_encoder,
                "control.minStageEncoder must not exceed maxStageEncoder",
            ),
            check(
                control.min_encoder_limit <= control.min_stage_encoder
                    && control.max_stage_encoder <= control.max_encoder_limit,
                "control stage encoder range must lie within the encoder limits",
            ),
            check(
                match control.range_conversion {
                    RangeConversion::Identity => true,
                    RangeConversion::Linear { scale, zero_range } => {
                        scale.is_finite() && scale != 0.0 && zero_range.is_finite()
                    }
                },
                "control.rangeConversion must have a finite, non-zero scale",
            ),
            check(
                calc.lower_focus_limit <= calc.upper_focus_limit,
                "calculation.lowerFocusLimit must not exceed upperFocusLimit",
            ),
            check(
                calc.default_initial_elevation.is_finite() && calc.default_initial_elevation > 0.0,
                "calculation.defaultInitialElevation must be positive",
            ),
            check(
                calc.focus_error_gain.is_finite(),
                "calculation.focusErrorGain must be finite",
            ),
            check(
                self.timing.match_timeout_ms > 0,
                "timing.matchTimeoutMs must be positive",
            ),
        ];

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => {
                Err(ConfigError::Invalid(errors.iter().cloned().collect()))
            }
        }
    }
}

fn check(ok: bool, message: &str) -> Validation<(), NonEmptyVec<String>> {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(message.to_string())
    }
}
