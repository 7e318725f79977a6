//! Move, position and setElevation: convert the demand to encoder counts
//! and drive the axis there.

use super::{ExecutionContext, MotionPlan};
use crate::algorithms::{range_distance_to_encoder, stage_position_to_encoder, ConversionError};
use crate::command::{double_param, CommandKey, CommandRequest};
use crate::core::State;
use crate::device::DeviceCommand;
use crate::enforcement::{describe, Preconditions};
use crate::matcher::DemandMatcher;
use crate::params::{keys, Units};
use crate::status::{CommandStatus, Issue};

/// Build the plan for `key`, or the status that ends the run before any
/// motion.
///
/// The motion precondition is checked against the current snapshot; a
/// failure is `NoLongerValid`. A demand outside the encoder limits is an
/// `Error`.
pub fn plan(
    key: CommandKey,
    request: &CommandRequest,
    ctx: &ExecutionContext,
) -> Result<MotionPlan, CommandStatus> {
    let state = ctx.snapshot();
    if let Err(violations) = Preconditions::motion().check(&state) {
        return Err(CommandStatus::no_longer_valid(Issue::wrong_state(format!(
            "Assembly state of {} does not allow {}: {}",
            state.summary(),
            key,
            describe(&violations)
        ))));
    }

    let encoder = target_encoder(key, request, ctx).map_err(|failure| match failure {
        Failure::Parameter(issue) => CommandStatus::invalid(issue),
        Failure::Conversion(err) => CommandStatus::error(err.to_string()),
    })?;

    Ok(MotionPlan {
        command: DeviceCommand::Position { encoder },
        matcher: DemandMatcher::position(encoder),
    })
}

enum Failure {
    Parameter(Issue),
    Conversion(ConversionError),
}

fn target_encoder(
    key: CommandKey,
    request: &CommandRequest,
    ctx: &ExecutionContext,
) -> Result<i64, Failure> {
    let control = &ctx.config.control;
    let params = &request.params;
    match key {
        CommandKey::Move => {
            let mm = double_param(params, keys::STAGE_POSITION, Units::Millimeters)
                .map_err(Failure::Parameter)?;
            stage_position_to_encoder(control, mm).map_err(Failure::Conversion)
        }
        CommandKey::Position => {
            let km = double_param(params, keys::RANGE_DISTANCE, Units::Kilometers)
                .map_err(Failure::Parameter)?;
            range_distance_to_encoder(control, km).map_err(Failure::Conversion)
        }
        CommandKey::SetElevation => {
            // Outside following, the elevation is used as the range distance.
            let km = double_param(params, keys::ELEVATION, Units::Kilometers)
                .map_err(Failure::Parameter)?;
            range_distance_to_encoder(control, km).map_err(Failure::Conversion)
        }
        other => Err(Failure::Parameter(Issue::UnsupportedCommandInState {
            prefix: request.prefix.clone(),
            mode: format!("{other} executor"),
        })),
    }
}
