//! Assembly state: the small combinatorial record every command consults.
//!
//! The record is owned by the dispatcher. Everyone else works with copies
//! (snapshots) and asks for changes through [`StateUpdate`] values.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for values that describe the position of a state machine.
///
/// All methods are pure. States are immutable values; changing state means
/// producing a new value.
///
/// # Example
///
/// ```rust
/// use trombone::core::{Lifecycle, State};
///
/// assert_eq!(Lifecycle::Ready.name(), "Ready");
/// assert_eq!(Lifecycle::Ready.summary(), "Ready");
/// ```
pub trait State:
    Clone + PartialEq + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync
{
    /// Short name for display and logging.
    fn name(&self) -> &str;

    /// Longer description of the whole value.
    ///
    /// Defaults to [`State::name`]; composite states override it.
    fn summary(&self) -> String {
        self.name().to_string()
    }
}

crate::state_enum! {
    /// Command lifecycle stage of the assembly.
    pub enum Lifecycle {
        Uninitialized => "Uninitialized",
        Ready => "Ready",
        Busy => "Busy",
        /// Only while the assembly is following.
        Continuous => "Continuous",
    }
}

crate::state_enum! {
    /// Motion stage of the controlled axis.
    pub enum Motion {
        NotIndexed => "NotIndexed",
        Indexed => "Indexed",
        Moving => "Moving",
    }
}

/// The four orthogonal fields describing the assembly's operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyState {
    pub lifecycle: Lifecycle,
    pub motion: Motion,
    pub sodium_layer_ready: bool,
    pub nss_in_use: bool,
}

impl Default for AssemblyState {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            motion: Motion::NotIndexed,
            sodium_layer_ready: false,
            nss_in_use: false,
        }
    }
}

impl AssemblyState {
    /// Produce the state that results from applying `update` (pure).
    pub fn apply(&self, update: &StateUpdate) -> AssemblyState {
        AssemblyState {
            lifecycle: update.lifecycle.unwrap_or(self.lifecycle),
            motion: update.motion.unwrap_or(self.motion),
            sodium_layer_ready: update.sodium_layer_ready.unwrap_or(self.sodium_layer_ready),
            nss_in_use: update.nss_in_use.unwrap_or(self.nss_in_use),
        }
    }

    /// True when the axis has been initialized and indexed, so that motion
    /// commands may run.
    pub fn allows_motion(&self) -> bool {
        self.lifecycle != Lifecycle::Uninitialized
            && matches!(self.motion, Motion::Indexed | Motion::Moving)
    }
}

impl State for AssemblyState {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    fn summary(&self) -> String {
        format!(
            "lifecycle={}/motion={}/sodiumLayerReady={}/nssInUse={}",
            self.lifecycle, self.motion, self.sodium_layer_ready, self.nss_in_use
        )
    }
}

/// A partial change to [`AssemblyState`]. Unset fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<Motion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium_layer_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nss_in_use: Option<bool>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn motion(mut self, motion: Motion) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn sodium_layer_ready(mut self, ready: bool) -> Self {
        self.sodium_layer_ready = Some(ready);
        self
    }

    pub fn nss_in_use(mut self, in_use: bool) -> Self {
        self.nss_in_use = Some(in_use);
        self
    }

    /// `Busy/Moving`, set when a motion command starts.
    pub fn busy_moving() -> Self {
        Self::new()
            .lifecycle(Lifecycle::Busy)
            .motion(Motion::Moving)
    }

    /// `Ready/Indexed`, set when a motion completes or following stops.
    pub fn ready_indexed() -> Self {
        Self::new()
            .lifecycle(Lifecycle::Ready)
            .motion(Motion::Indexed)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_uninitialized() {
        let state = AssemblyState::default();
        assert_eq!(state.lifecycle, Lifecycle::Uninitialized);
        assert_eq!(state.motion, Motion::NotIndexed);
        assert!(!state.sodium_layer_ready);
        assert!(!state.nss_in_use);
    }

    #[test]
    fn apply_changes_only_set_fields() {
        let state = AssemblyState {
            sodium_layer_ready: true,
            ..AssemblyState::default()
        };

        let next = state.apply(&StateUpdate::ready_indexed());

        assert_eq!(next.lifecycle, Lifecycle::Ready);
        assert_eq!(next.motion, Motion::Indexed);
        assert!(next.sodium_layer_ready);
        assert!(!next.nss_in_use);
    }

    #[test]
    fn apply_is_pure() {
        let state = AssemblyState::default();
        let _ = state.apply(&StateUpdate::busy_moving());
        assert_eq!(state, AssemblyState::default());
    }

    #[test]
    fn empty_update_is_identity() {
        let state = AssemblyState::default();
        assert!(StateUpdate::new().is_empty());
        assert_eq!(state.apply(&StateUpdate::new()), state);
    }

    #[test]
    fn motion_requires_initialized_and_indexed() {
        let mut state = AssemblyState::default();
        assert!(!state.allows_motion());

        state.lifecycle = Lifecycle::Ready;
        assert!(!state.allows_motion());

        state.motion = Motion::Indexed;
        assert!(state.allows_motion());

        state.motion = Motion::Moving;
        state.lifecycle = Lifecycle::Busy;
        assert!(state.allows_motion());

        state.lifecycle = Lifecycle::Uninitialized;
        assert!(!state.allows_motion());
    }

    #[test]
    fn summary_names_every_field() {
        let summary = AssemblyState::default().summary();
        assert_eq!(
            summary,
            "lifecycle=Uninitialized/motion=NotIndexed/sodiumLayerReady=false/nssInUse=false"
        );
    }

    #[test]
    fn state_update_serializes_sparse() {
        let json = serde_json::to_string(&StateUpdate::new().sodium_layer_ready(true)).unwrap();
        assert_eq!(json, r#"{"sodiumLayerReady":true}"#);
    }
}
