//! Datum: drive the axis to its reference position.
//!
//! Datum has no precondition; it is how an uninitialized assembly becomes
//! `Ready/Indexed`. The sodium-layer and NSS flags are left alone.

use super::MotionPlan;
use crate::device::DeviceCommand;
use crate::matcher::DemandMatcher;

pub fn plan() -> MotionPlan {
    MotionPlan {
        command: DeviceCommand::Datum,
        matcher: DemandMatcher::idle(),
    }
}
