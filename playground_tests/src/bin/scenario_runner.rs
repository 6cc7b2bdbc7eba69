//! Runs the grab pull scenario headlessly and prints a trace.
//!
//! Usage:
//!   cargo run -p playground_tests --bin scenario_runner -- [--config cfg.json]
//!       [--gap 40] [--ticks 60]

use std::env;
use std::path::PathBuf;

use playground_shared::config::PlaygroundConfig;
use playground_tests::{open_world, pull_and_break};
use tracing::info;

struct Args {
    config: Option<PathBuf>,
    gap: f32,
    ticks: u32,
}

fn parse_args() -> Args {
    let mut out = Args {
        config: None,
        gap: 40.0,
        ticks: 60,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--gap" if i + 1 < args.len() => {
                out.gap = args[i + 1].parse().unwrap_or(40.0);
                i += 2;
            }
            "--ticks" if i + 1 < args.len() => {
                out.ticks = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let cfg = match &args.config {
        Some(path) => PlaygroundConfig::from_path(path)?,
        None => open_world(),
    };
    info!(gap = args.gap, ticks = args.ticks, reach = cfg.grab.reach, "running pull scenario");

    let trace = pull_and_break(&cfg, args.gap, args.ticks)?;
    println!("grabbed: {}", trace.grabbed);
    println!("{:>6} {:>9} {:>9} {:>9}", "tick", "vx", "vy", "gap");
    for s in trace.samples.iter().step_by(10) {
        println!(
            "{:>6} {:>9.2} {:>9.2} {:>9.2}",
            s.tick, s.velocity.x, s.velocity.y, s.distance
        );
    }
    match trace.break_ticks {
        Some(n) => println!("grab cleared {n} tick(s) after aiming away"),
        None => println!("grab still held after aiming away"),
    }
    for event in &trace.events {
        info!(?event, "event");
    }
    Ok(())
}
