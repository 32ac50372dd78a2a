#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a scripted Skirmish battle.

mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skirmish_core::{ClientRequest, FlowKind};
use skirmish_engine::Engine;
use skirmish_scheduler::{SchedulerConfig, TickReport};
use skirmish_world::query;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::scenario::Script;

/// Runs a scripted battle through the tick scheduler and prints a summary
/// of every tick.
#[derive(Debug, Parser)]
#[command(name = "skirmish", version)]
struct Args {
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 60)]
    ticks: u64,
    /// Scheduler configuration file; the built-in configuration is used
    /// when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Script of client commands; the built-in demo script is used when
    /// omitted.
    #[arg(long)]
    script: Option<PathBuf>,
    /// Overrides the seed of the tick identifier generator.
    #[arg(long)]
    seed: Option<u64>,
}

/// Entry point for the Skirmish command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::builtin()?,
    };
    if let Some(seed) = args.seed {
        config = config.with_tick_id_seed(seed);
    }
    let script = match &args.script {
        Some(path) => Script::from_file(path)?,
        None => Script::demo()?,
    };

    let world = scenario::demo_world().context("failed to build demo world")?;
    let mut engine = Engine::new(world, config).context("invalid scheduler configuration")?;
    info!(ticks = args.ticks, "starting battle");

    for _ in 0..args.ticks {
        for command in script.due(engine.now()) {
            let request = ClientRequest::new(engine.current_tick_id(), command.clone());
            match engine.submit(request) {
                Ok(ids) => info!(tick = %engine.now(), flow = %command.flow(), commands = ?ids, "scheduled"),
                Err(error) => warn!(tick = %engine.now(), flow = %command.flow(), %error, "request rejected"),
            }
        }
        let report = engine.tick();
        println!("{}", summarize(&report));
        let dirty = report.into_dirty();
        if !dirty.is_empty() {
            let entities: Vec<_> = dirty.entities().collect();
            debug!(tick = %engine.now(), ?entities, "touched entities");
        }
    }

    println!("final state at tick {}:", engine.now());
    for snapshot in query::entity_view(engine.world(), engine.now()).iter() {
        println!(
            "  {} {:?} at {} with {} hp",
            snapshot.id,
            snapshot.kind,
            snapshot.cell,
            snapshot.health.get()
        );
    }
    Ok(())
}

fn summarize(report: &TickReport) -> String {
    let visits: Vec<String> = FlowKind::ALL
        .iter()
        .map(|kind| format!("{kind}={}", report.visited(*kind)))
        .collect();
    format!(
        "tick {:>3} [{}] {} faults={} dirty={}",
        report.tick(),
        report.tick_id(),
        visits.join(" "),
        report.faults().count(),
        report.dirty().entities().count()
    )
}
