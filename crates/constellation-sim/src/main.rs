//! Constellation routing simulator CLI
//!
//! Usage:
//!   simulate --config scenarios/demo.json --protocol shortest-path \
//!            --output report.json --print-tables

use anyhow::{Context, Result};
use beam_routing::ProtocolKind;
use clap::Parser;
use constellation_sim::{Scenario, ScenarioConfig};
use orbital_glaf::export;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "simulate",
    about = "Simulate packet routing over a LEO satellite constellation"
)]
struct Args {
    /// Scenario JSON file; built-in demo scenario if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Routing protocol override (greedy | shortest-path)
    #[arg(short, long)]
    protocol: Option<ProtocolKind>,

    /// Simulated duration override in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Write the run report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write a topology snapshot as JSON
    #[arg(long)]
    export_topology: Option<PathBuf>,

    /// Snapshot time in seconds for --export-topology
    #[arg(long, default_value_t = 0.0)]
    at: f64,

    /// Print every router's table at the end of the run
    #[arg(long)]
    print_tables: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let mut config = match &args.config {
        Some(path) => ScenarioConfig::load(path).with_context(|| format!("loading {:?}", path))?,
        None => ScenarioConfig::default(),
    };
    if let Some(protocol) = args.protocol {
        config.routing.protocol = protocol;
    }
    if let Some(duration) = args.duration {
        config.duration_s = duration;
    }

    info!("{}", "=".repeat(60));
    info!("Constellation routing simulator: scenario {}", config.name);
    info!("{}", "=".repeat(60));

    let mut scenario = Scenario::build(config)?;
    let stats = scenario.network().topology().stats();
    info!(
        "{} satellites in {} planes, {} ground stations, {} links",
        stats.satellites, stats.planes, stats.ground_stations, stats.total_links
    );

    if let Some(path) = &args.export_topology {
        scenario.run_to(Duration::try_from_secs_f64(args.at).context("invalid --at")?);
        let snapshot = export::snapshot(scenario.network().topology(), args.at);
        std::fs::write(path, export::to_json(&snapshot)?)?;
        info!("Wrote topology snapshot at {:.1}s to {:?}", args.at, path);
    }

    let report = scenario.run();

    if args.print_tables {
        println!("{}", scenario.network().routing_tables());
    }

    let summary = &report.summary;
    info!("{}", "=".repeat(60));
    info!("SUMMARY ({})", report.protocol);
    info!("{}", "=".repeat(60));
    info!("Sent: {}  Delivered: {}  Dropped: {}", summary.sent, summary.delivered, summary.dropped);
    info!("Delivery ratio: {:.1}%", summary.delivery_ratio * 100.0);
    if let (Some(mean), Some(max)) = (summary.mean_latency_ms, summary.max_latency_ms) {
        info!("Latency: mean {:.3} ms, max {:.3} ms", mean, max);
    }
    if let Some(hops) = summary.mean_hops {
        info!("Mean hops: {:.2}", hops);
    }
    for (reason, count) in &summary.drops_by_reason {
        info!("  dropped {}: {}", reason, count);
    }

    if let Some(path) = &args.output {
        report.write(path)?;
        info!("Wrote report {} to {:?}", report.run_id, path);
    }

    Ok(())
}
