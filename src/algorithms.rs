//! Unit conversions between range distance, stage position, encoder counts
//! and the focus/zenith-angle geometry used while following.
//!
//! Every function is pure. Calibration constants come from
//! [`ControlConfig`] and [`CalculationConfig`].

use crate::config::{CalculationConfig, ControlConfig, RangeConversion};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("encoder value {encoder} is outside the limits [{min}, {max}]")]
    EncoderOutOfRange { encoder: i64, min: i64, max: i64 },

    #[error("zenith angle {degrees} deg must be in [0, 90)")]
    InvalidZenithAngle { degrees: f64 },

    #[error("{quantity} is not a finite number")]
    NotFinite { quantity: &'static str },
}

/// Convert a stage position (mm) to encoder counts.
///
/// `round(stageZero + positionScale * mm)`; results outside
/// `[minEncoderLimit, maxEncoderLimit]` are rejected, not clamped.
///
/// ```rust
/// use trombone::algorithms::stage_position_to_encoder;
/// use trombone::config::ControlConfig;
///
/// let control = ControlConfig::default();
/// assert_eq!(stage_position_to_encoder(&control, 10.0), Ok(280));
/// assert!(stage_position_to_encoder(&control, 500.0).is_err());
/// ```
pub fn stage_position_to_encoder(
    control: &ControlConfig,
    millimeters: f64,
) -> Result<i64, ConversionError> {
    if !millimeters.is_finite() {
        return Err(ConversionError::NotFinite {
            quantity: "stage position",
        });
    }
    let raw = (control.stage_zero + control.position_scale * millimeters).round();
    let (min, max) = (control.min_encoder_limit, control.max_encoder_limit);
    if raw < min as f64 || raw > max as f64 {
        return Err(ConversionError::EncoderOutOfRange {
            encoder: raw as i64,
            min,
            max,
        });
    }
    Ok(raw as i64)
}

/// Inverse of [`stage_position_to_encoder`].
pub fn encoder_to_stage_position(control: &ControlConfig, encoder: i64) -> f64 {
    (encoder as f64 - control.stage_zero) / control.position_scale
}

/// Convert a range distance (km) to a stage position (mm) with the
/// configured strategy.
pub fn range_distance_to_stage_position(control: &ControlConfig, kilometers: f64) -> f64 {
    match control.range_conversion {
        RangeConversion::Identity => kilometers,
        RangeConversion::Linear { scale, zero_range } => scale * (kilometers - zero_range),
    }
}

pub fn range_distance_to_encoder(
    control: &ControlConfig,
    kilometers: f64,
) -> Result<i64, ConversionError> {
    if !kilometers.is_finite() {
        return Err(ConversionError::NotFinite {
            quantity: "range distance",
        });
    }
    stage_position_to_encoder(control, range_distance_to_stage_position(control, kilometers))
}

/// Clamp a focus error (µm) to the configured soft limits.
pub fn clamp_focus_error(calc: &CalculationConfig, focus_error: f64) -> f64 {
    focus_error.clamp(calc.lower_focus_limit, calc.upper_focus_limit)
}

/// Range distance correction (km) for a focus error (µm).
pub fn focus_error_to_range_distance(calc: &CalculationConfig, focus_error: f64) -> f64 {
    calc.focus_error_gain * clamp_focus_error(calc, focus_error)
}

fn check_zenith_angle(degrees: f64) -> Result<f64, ConversionError> {
    if degrees.is_finite() && (0.0..90.0).contains(&degrees) {
        Ok(degrees.to_radians())
    } else {
        Err(ConversionError::InvalidZenithAngle { degrees })
    }
}

/// Slant range to a layer at `elevation` (km) seen at `zenith_angle` (deg).
pub fn zenith_angle_to_range_distance(
    elevation: f64,
    zenith_angle: f64,
) -> Result<f64, ConversionError> {
    let radians = check_zenith_angle(zenith_angle)?;
    Ok(elevation / radians.cos())
}

/// Elevation of a point at `range` (km) along `zenith_angle` (deg).
pub fn range_distance_to_elevation(range: f64, zenith_angle: f64) -> Result<f64, ConversionError> {
    let radians = check_zenith_angle(zenith_angle)?;
    Ok(range * radians.cos())
}

/// Focus-compensated range distance (km) for the follow loop.
pub fn focus_zenith_angle_to_range_distance(
    calc: &CalculationConfig,
    elevation: f64,
    focus_error: f64,
    zenith_angle: f64,
) -> Result<f64, ConversionError> {
    let range = zenith_angle_to_range_distance(elevation, zenith_angle)?;
    Ok(range + focus_error_to_range_distance(calc, focus_error))
}
