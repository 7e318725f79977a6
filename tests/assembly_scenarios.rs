//! End-to-end scenarios: an assembly driving a simulated axis.
//!
//! Every test runs on a paused clock, so the simulated axis and the match
//! timeouts advance deterministically.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use trombone::config::AssemblyConfig;
use trombone::core::{Lifecycle, Motion, StateUpdate};
use trombone::device::{AxisConfig, DeviceCommand, SimulatedAxis};
use trombone::{Assembly, AssemblyError, CommandRequest, CommandStatus, Commands, Issue};

fn start() -> (Arc<SimulatedAxis>, Assembly, Commands) {
    let axis = SimulatedAxis::spawn(AxisConfig::default());
    let assembly = Assembly::spawn(AssemblyConfig::default(), axis.clone()).unwrap();
    let commands = assembly.commands().clone();
    (axis, assembly, commands)
}

async fn datumed() -> (Arc<SimulatedAxis>, Assembly, Commands) {
    let (axis, assembly, commands) = start();
    assert_eq!(
        assembly.execute(commands.datum()).await.unwrap(),
        CommandStatus::Completed
    );
    (axis, assembly, commands)
}

async fn following(nss_in_use: bool) -> (Arc<SimulatedAxis>, Assembly, Commands) {
    let (axis, assembly, commands) = datumed().await;
    assembly
        .update_state(StateUpdate::new().sodium_layer_ready(true))
        .await
        .unwrap();
    assert_eq!(
        assembly.execute(commands.follow(nss_in_use)).await.unwrap(),
        CommandStatus::Completed
    );
    (axis, assembly, commands)
}

async fn wait_for_lifecycle(assembly: &Assembly, lifecycle: Lifecycle) {
    let mut state = assembly.watch_state();
    while state.borrow().lifecycle != lifecycle {
        state.changed().await.unwrap();
    }
}

fn issue_message(status: &CommandStatus) -> String {
    status.message().unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn datum_move_then_follow_without_sodium_layer() {
    let (axis, assembly, commands) = start();
    let state = assembly.current_state();
    assert_eq!(state.lifecycle, Lifecycle::Uninitialized);
    assert_eq!(state.motion, Motion::NotIndexed);
    assert!(!state.sodium_layer_ready);
    assert!(!state.nss_in_use);

    let status = assembly.execute(commands.datum()).await.unwrap();
    assert_eq!(status, CommandStatus::Completed);
    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));

    let status = assembly.execute(commands.move_to(10.0)).await.unwrap();
    assert_eq!(status, CommandStatus::Completed);
    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));
    assert_eq!(axis.position(), 280);

    let status = assembly.execute(commands.follow(true)).await.unwrap();
    assert!(matches!(status, CommandStatus::NoLongerValid { .. }));
    let message = issue_message(&status);
    assert!(message.contains("lifecycle=Ready"));
    assert!(message.contains("motion=Indexed"));
    assert!(message.contains("sodiumLayerReady=false"));
}

#[tokio::test(start_paused = true)]
async fn follow_when_sodium_layer_ready() {
    let (_axis, assembly, commands) = following(false).await;

    let state = assembly.current_state();
    assert_eq!(state.lifecycle, Lifecycle::Continuous);
    assert_eq!(state.motion, Motion::Moving);
    assert!(!state.nss_in_use);

    let status = assembly.execute(commands.move_to(5.0)).await.unwrap();
    assert!(matches!(status, CommandStatus::Invalid { .. }));
}

#[tokio::test(start_paused = true)]
async fn uninitialized_assembly_only_completes_datum_and_init() {
    let (_axis, assembly, commands) = start();

    for request in [
        commands.move_to(10.0),
        commands.position(95.0),
        commands.set_elevation(95.0),
        commands.set_angle(10.0),
        commands.follow(false),
        commands.stop(),
    ] {
        let prefix = request.prefix.clone();
        let status = assembly.execute(request).await.unwrap();
        assert!(status.is_rejection(), "{prefix} gave {status}");
    }

    assert_eq!(
        assembly.execute(commands.init()).await.unwrap(),
        CommandStatus::Completed
    );
    assert_eq!(assembly.current_state().lifecycle, Lifecycle::Uninitialized);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_active_motion() {
    let (axis, assembly, commands) = datumed().await;

    let pending = assembly.submit(commands.move_to(100.0));
    wait_for_lifecycle(&assembly, Lifecycle::Busy).await;

    let stop = assembly.execute(commands.stop()).await.unwrap();
    assert_eq!(stop, CommandStatus::Cancelled);
    assert_eq!(pending.wait().await.unwrap(), CommandStatus::Cancelled);

    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));
    assert_eq!(axis.submitted().last(), Some(&DeviceCommand::Cancel));

    // The slot is free again.
    assert_eq!(
        assembly.execute(commands.move_to(20.0)).await.unwrap(),
        CommandStatus::Completed
    );
    assert_eq!(axis.position(), 360);
}

#[tokio::test(start_paused = true)]
async fn busy_assembly_rejects_second_command() {
    let (_axis, assembly, commands) = datumed().await;

    let first = assembly.submit(commands.move_to(50.0));
    let second = assembly.execute(commands.datum()).await.unwrap();

    assert!(matches!(second, CommandStatus::Invalid { .. }));
    assert!(issue_message(&second).contains("busy executing move"));
    assert_eq!(first.wait().await.unwrap(), CommandStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn following_accepts_angle_and_elevation_only() {
    let (_axis, assembly, commands) = following(false).await;

    for request in [
        commands.datum(),
        commands.move_to(1.0),
        commands.position(95.0),
        commands.follow(false),
    ] {
        let status = assembly.execute(request).await.unwrap();
        assert!(matches!(status, CommandStatus::Invalid { .. }), "{status}");
    }

    let status = assembly.execute(commands.set_angle(30.0)).await.unwrap();
    assert_eq!(status, CommandStatus::Completed);
    assert_eq!(assembly.current_state().lifecycle, Lifecycle::Continuous);

    let status = assembly.execute(commands.set_elevation(100.0)).await.unwrap();
    assert_eq!(status, CommandStatus::Completed);
    assert_eq!(assembly.current_state().lifecycle, Lifecycle::Continuous);
}

#[tokio::test(start_paused = true)]
async fn rejected_follow_update_keeps_tracking() {
    let (axis, assembly, commands) = following(false).await;
    assert_eq!(
        assembly.execute(commands.set_angle(20.0)).await.unwrap(),
        CommandStatus::Completed
    );
    let before = axis.submitted().len();

    let status = assembly.execute(commands.set_elevation(500.0)).await.unwrap();
    assert!(matches!(status, CommandStatus::Error { .. }), "{status}");
    assert_eq!(axis.submitted().len(), before, "nothing was submitted");
    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Continuous, Motion::Moving));

    assert_eq!(
        assembly.execute(commands.set_angle(10.0)).await.unwrap(),
        CommandStatus::Completed
    );
    assert_eq!(assembly.current_state().lifecycle, Lifecycle::Continuous);

    // Following again starts from the last accepted elevation.
    assert_eq!(
        assembly.execute(commands.stop()).await.unwrap(),
        CommandStatus::Completed
    );
    let mut solutions = assembly.subscribe_follow();
    assert_eq!(
        assembly.execute(commands.follow(false)).await.unwrap(),
        CommandStatus::Completed
    );
    assert_eq!(solutions.recv().await.unwrap().elevation, 95.0);
}

#[tokio::test(start_paused = true)]
async fn failed_set_elevation_is_not_used_for_following() {
    let (_axis, assembly, commands) = datumed().await;

    let status = assembly.execute(commands.set_elevation(500.0)).await.unwrap();
    assert!(matches!(status, CommandStatus::Error { .. }));

    assembly
        .update_state(StateUpdate::new().sodium_layer_ready(true))
        .await
        .unwrap();
    let mut solutions = assembly.subscribe_follow();
    assert_eq!(
        assembly.execute(commands.follow(false)).await.unwrap(),
        CommandStatus::Completed
    );
    let initial = solutions.recv().await.unwrap();
    assert_eq!(initial.elevation, 95.0);
    assert_eq!(initial.encoder, 240);
}

#[tokio::test(start_paused = true)]
async fn stop_while_following_returns_to_ready() {
    let (_axis, assembly, commands) = following(true).await;
    assert!(assembly.current_state().nss_in_use);

    let status = assembly.execute(commands.stop()).await.unwrap();
    assert_eq!(status, CommandStatus::Completed);

    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));

    let status = assembly.execute(commands.set_angle(10.0)).await.unwrap();
    assert!(matches!(status, CommandStatus::Invalid { .. }));
}

#[tokio::test(start_paused = true)]
async fn follow_publishes_solutions() {
    let (_axis, assembly, commands) = datumed().await;
    let mut solutions = assembly.subscribe_follow();

    assert_eq!(
        assembly.execute(commands.set_elevation(100.0)).await.unwrap(),
        CommandStatus::Completed
    );
    assembly
        .update_state(StateUpdate::new().sodium_layer_ready(true))
        .await
        .unwrap();
    assert_eq!(
        assembly.execute(commands.follow(false)).await.unwrap(),
        CommandStatus::Completed
    );

    let initial = solutions.recv().await.unwrap();
    assert_eq!(initial.elevation, 100.0, "setElevation is remembered");
    assert_eq!(initial.encoder, 280);

    assembly.update_focus_error(4.0).unwrap();
    let focused = solutions.recv().await.unwrap();
    assert_eq!(focused.focus_error, 4.0);
    assert_eq!(focused.encoder, 304);
}

#[tokio::test(start_paused = true)]
async fn stalled_axis_times_out_after_the_bound() {
    let (axis, assembly, commands) = start();
    axis.set_stalled(true);

    let started = Instant::now();
    let status = assembly.execute(commands.datum()).await.unwrap();

    assert_eq!(status, CommandStatus::error("timeout"));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));

    // The failed run leaves the state where the motion put it.
    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Busy, Motion::Moving));
}

#[tokio::test(start_paused = true)]
async fn device_fault_fails_the_command() {
    let (axis, assembly, commands) = datumed().await;

    let pending = assembly.submit(commands.move_to(100.0));
    wait_for_lifecycle(&assembly, Lifecycle::Busy).await;
    axis.inject_fault("axis 1 in high limit");

    assert_eq!(
        pending.wait().await.unwrap(),
        CommandStatus::error("axis 1 in high limit")
    );
}

#[tokio::test(start_paused = true)]
async fn out_of_range_move_is_an_error_without_motion() {
    let (axis, assembly, commands) = datumed().await;
    let before = axis.submitted().len();

    let status = assembly.execute(commands.move_to(500.0)).await.unwrap();

    assert!(matches!(status, CommandStatus::Error { .. }));
    assert_eq!(axis.submitted().len(), before);
    let state = assembly.current_state();
    assert_eq!((state.lifecycle, state.motion), (Lifecycle::Ready, Motion::Indexed));
}

#[tokio::test(start_paused = true)]
async fn unknown_and_malformed_commands_are_invalid() {
    let (_axis, assembly, commands) = datumed().await;

    let unknown = CommandRequest::new(
        format!("{}.dance", commands.component_prefix()),
        Default::default(),
    );
    let status = assembly.execute(unknown).await.unwrap();
    assert!(issue_message(&status).contains("does not support the command"));

    let malformed = commands.request(trombone::CommandKey::Position);
    let status = assembly.execute(malformed).await.unwrap();
    assert_eq!(
        status,
        CommandStatus::invalid(Issue::MissingKey {
            key: "rangeDistance".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn external_updates_are_checked_against_mode() {
    let (_axis, assembly, _commands) = datumed().await;

    let err = assembly
        .update_state(StateUpdate::new().lifecycle(Lifecycle::Continuous))
        .await
        .unwrap_err();
    assert!(matches!(err, AssemblyError::StateRejected(_)));

    let state = assembly
        .update_state(StateUpdate::new().sodium_layer_ready(true))
        .await
        .unwrap();
    assert!(state.sodium_layer_ready);
    assert_eq!(state.lifecycle, Lifecycle::Ready);
}

#[tokio::test(start_paused = true)]
async fn history_records_every_change() {
    let (_axis, assembly, _commands) = datumed().await;

    let history = assembly.history().await.unwrap();
    let path: Vec<(Lifecycle, Motion)> = history
        .get_path()
        .iter()
        .map(|s| (s.lifecycle, s.motion))
        .collect();

    assert_eq!(
        path,
        vec![
            (Lifecycle::Uninitialized, Motion::NotIndexed),
            (Lifecycle::Busy, Motion::Moving),
            (Lifecycle::Ready, Motion::Indexed),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn tell_runs_without_reply() {
    let (_axis, assembly, commands) = start();

    assembly.tell(commands.datum()).unwrap();
    wait_for_lifecycle(&assembly, Lifecycle::Ready).await;

    assert_eq!(assembly.current_state().motion, Motion::Indexed);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_commands() {
    let (axis, assembly, commands) = start();
    axis.set_stalled(true);

    let pending = assembly.submit(commands.datum());
    wait_for_lifecycle(&assembly, Lifecycle::Busy).await;
    assembly.shutdown().await.unwrap();

    assert_eq!(pending.wait().await.unwrap(), CommandStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected_at_spawn() {
    let axis = SimulatedAxis::spawn(AxisConfig::default());
    let mut config = AssemblyConfig::default();
    config.control.position_scale = -1.0;

    let result = Assembly::spawn(config, axis);
    assert!(matches!(result, Err(AssemblyError::Config(_))));
}
