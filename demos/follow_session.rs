//! Follow Session
//!
//! Drives an assembly against the simulated axis through a typical night:
//! datum, a manual move, then following the sodium layer while the
//! telescope tracks and focus errors arrive.
//!
//! Key concepts:
//! - Commands are rejected when the assembly's state does not allow them
//! - Following is a mode: motion commands are refused until stop
//! - Every follow demand is published as a `FollowSolution`
//!
//! Run with: cargo run --example follow_session
//! Set TROMBONE_LOG_JSON=true for JSON log lines.

use trombone::config::AssemblyConfig;
use trombone::core::{AssemblyState, State, StateUpdate};
use trombone::device::{AxisConfig, SimulatedAxis};
use trombone::{Assembly, AssemblyError, CommandRequest};

async fn run(
    assembly: &Assembly,
    label: &str,
    request: CommandRequest,
) -> Result<(), AssemblyError> {
    let status = assembly.execute(request).await?;
    println!("{label:<28} -> {status}");
    print_state(&assembly.current_state());
    Ok(())
}

fn print_state(state: &AssemblyState) {
    println!("{:<28}    {}", "", state.summary());
}

#[tokio::main]
async fn main() -> Result<(), AssemblyError> {
    trombone::logging::init();

    println!("=== Trombone Follow Session ===\n");

    let axis = SimulatedAxis::spawn(AxisConfig::default());
    let assembly = Assembly::spawn(AssemblyConfig::default(), axis.clone())?;
    let commands = assembly.commands().clone();
    let mut solutions = assembly.subscribe_follow();

    print_state(&assembly.current_state());
    run(&assembly, "move before datum", commands.move_to(10.0)).await?;
    run(&assembly, "datum", commands.datum()).await?;
    run(&assembly, "move 10 mm", commands.move_to(10.0)).await?;
    println!("axis encoder: {}\n", axis.position());

    run(&assembly, "follow (layer not ready)", commands.follow(false)).await?;
    assembly.update_state(StateUpdate::new().sodium_layer_ready(true)).await?;
    run(&assembly, "follow", commands.follow(false)).await?;
    run(&assembly, "move while following", commands.move_to(20.0)).await?;

    for angle in [10.0, 30.0, 45.0] {
        run(&assembly, &format!("setAngle {angle}"), commands.set_angle(angle)).await?;
    }
    assembly.update_focus_error(3.5)?;
    run(&assembly, "setElevation 100 km", commands.set_elevation(100.0)).await?;

    println!("\nFollow demands:");
    while let Ok(solution) = solutions.try_recv() {
        println!(
            "  el={:>6.1} km  za={:>4.1} deg  fe={:>4.1} um  range={:>7.2} km  encoder={}",
            solution.elevation,
            solution.zenith_angle,
            solution.focus_error,
            solution.range_distance,
            solution.encoder
        );
    }
    println!();

    run(&assembly, "stop", commands.stop()).await?;

    let history = assembly.history().await?;
    println!("\n{} state changes recorded", history.len());

    assembly.shutdown().await
}
