//! Property-based tests for the pure core: state values, history,
//! conversions and the dispatcher transition function.

use chrono::Utc;
use proptest::prelude::*;
use trombone::algorithms::{encoder_to_stage_position, stage_position_to_encoder};
use trombone::command::{CommandKey, Commands};
use trombone::config::ControlConfig;
use trombone::core::{
    AssemblyState, Guard, Lifecycle, Motion, State, StateHistory, StateTransition, StateUpdate,
};
use trombone::dispatcher::{transition, Dispatch, Effect, Event, Ticket};
use trombone::enforcement::Preconditions;
use trombone::executors::RunId;
use trombone::CommandStatus;

prop_compose! {
    fn arbitrary_state()(
        lifecycle in prop::sample::select(Lifecycle::ALL),
        motion in prop::sample::select(Motion::ALL),
        sodium_layer_ready in any::<bool>(),
        nss_in_use in any::<bool>(),
    ) -> AssemblyState {
        AssemblyState { lifecycle, motion, sodium_layer_ready, nss_in_use }
    }
}

prop_compose! {
    fn arbitrary_update()(
        lifecycle in prop::option::of(prop::sample::select(Lifecycle::ALL)),
        motion in prop::option::of(prop::sample::select(Motion::ALL)),
        sodium_layer_ready in prop::option::of(any::<bool>()),
        nss_in_use in prop::option::of(any::<bool>()),
    ) -> StateUpdate {
        let mut update = StateUpdate::new();
        if let Some(lifecycle) = lifecycle {
            update = update.lifecycle(lifecycle);
        }
        if let Some(motion) = motion {
            update = update.motion(motion);
        }
        if let Some(ready) = sodium_layer_ready {
            update = update.sodium_layer_ready(ready);
        }
        if let Some(in_use) = nss_in_use {
            update = update.nss_in_use(in_use);
        }
        update
    }
}

fn commands() -> Commands {
    Commands::new("NFIRAOS.cc.lgsTrombone")
}

fn request_for(commands: &Commands, key: CommandKey) -> trombone::CommandRequest {
    match key {
        CommandKey::Init => commands.init(),
        CommandKey::Datum => commands.datum(),
        CommandKey::Stop => commands.stop(),
        CommandKey::Move => commands.move_to(10.0),
        CommandKey::Position => commands.position(95.0),
        CommandKey::SetElevation => commands.set_elevation(95.0),
        CommandKey::SetAngle => commands.set_angle(30.0),
        CommandKey::Follow => commands.follow(false),
    }
}

fn submit(state: &AssemblyState, key: CommandKey) -> Vec<Effect> {
    let commands = commands();
    let event = Event::Submit {
        ticket: Ticket(1),
        run: RunId::new(),
        request: request_for(&commands, key),
    };
    transition(&Dispatch::default(), state, &commands, event).effects
}

fn completes(effects: &[Effect]) -> bool {
    effects.iter().any(|effect| {
        matches!(
            effect,
            Effect::Reply {
                status: CommandStatus::Completed,
                ..
            }
        )
    })
}

proptest! {
    #[test]
    fn guard_is_deterministic(state in arbitrary_state()) {
        let guard = Guard::new(|s: &AssemblyState| s.allows_motion());
        prop_assert_eq!(guard.check(&state), guard.check(&state));
    }

    #[test]
    fn summary_names_every_field(state in arbitrary_state()) {
        let summary = state.summary();
        prop_assert!(summary.contains(state.lifecycle.name()));
        prop_assert!(summary.contains(state.motion.name()));
        let sodium = format!("sodiumLayerReady={}", state.sodium_layer_ready);
        prop_assert!(summary.contains(&sodium));
    }

    #[test]
    fn apply_is_idempotent(state in arbitrary_state(), update in arbitrary_update()) {
        let once = state.apply(&update);
        prop_assert_eq!(once.apply(&update), once);
    }

    #[test]
    fn empty_update_changes_nothing(state in arbitrary_state()) {
        prop_assert_eq!(state.apply(&StateUpdate::new()), state);
    }

    #[test]
    fn stage_encoder_round_trip_within_one_count(millimeters in 4.0f64..121.0) {
        let control = ControlConfig::default();
        let encoder = stage_position_to_encoder(&control, millimeters).unwrap();
        let back = encoder_to_stage_position(&control, encoder);
        prop_assert!((back - millimeters).abs() <= 1.0 / control.position_scale);
    }

    #[test]
    fn encoder_is_always_within_limits(millimeters in -500.0f64..500.0) {
        let control = ControlConfig::default();
        if let Ok(encoder) = stage_position_to_encoder(&control, millimeters) {
            prop_assert!(encoder >= control.min_encoder_limit);
            prop_assert!(encoder <= control.max_encoder_limit);
        }
    }

    #[test]
    fn uninitialized_only_completes_datum_and_init(
        motion in prop::sample::select(Motion::ALL),
        sodium_layer_ready in any::<bool>(),
        key in prop::sample::select(CommandKey::ALL.to_vec()),
    ) {
        let state = AssemblyState {
            lifecycle: Lifecycle::Uninitialized,
            motion,
            sodium_layer_ready,
            nss_in_use: false,
        };
        let effects = submit(&state, key);
        if !matches!(key, CommandKey::Datum | CommandKey::Init) {
            prop_assert!(!completes(&effects), "{} completed: {:?}", key, effects);
        }
    }

    #[test]
    fn follow_starts_exactly_when_preconditions_hold(state in arbitrary_state()) {
        let effects = submit(&state, CommandKey::Follow);
        let allowed = state.allows_motion() && state.sodium_layer_ready;
        prop_assert_eq!(completes(&effects), allowed);
        prop_assert_eq!(Preconditions::follow().check(&state).is_ok(), allowed);
    }

    #[test]
    fn history_respects_its_limit(
        limit in 1usize..8,
        states in prop::collection::vec(arbitrary_state(), 0..20),
    ) {
        let mut history = StateHistory::with_limit(limit);
        let mut from = AssemblyState::default();
        for to in &states {
            history = history.record(StateTransition {
                from,
                to: *to,
                timestamp: Utc::now(),
                cause: "test".to_string(),
            });
            from = *to;
        }
        prop_assert_eq!(history.len(), states.len().min(limit));
        if let Some(last) = history.last() {
            prop_assert_eq!(Some(&last.to), states.last());
        }
    }

    #[test]
    fn history_record_is_pure(from in arbitrary_state(), to in arbitrary_state()) {
        let history = StateHistory::new();
        let next = history.record(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            cause: "test".to_string(),
        });
        prop_assert!(history.is_empty());
        prop_assert_eq!(next.len(), 1);
    }

    #[test]
    fn state_roundtrip_serialization(state in arbitrary_state()) {
        let json = serde_json::to_string(&state).unwrap();
        let back: AssemblyState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(state, back);
    }
}
