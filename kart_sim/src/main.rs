//! KartNet Simulator CLI
//!
//! Run deterministic replication scenarios against the prediction,
//! reconciliation and smoothing pipeline.

use anyhow::{bail, Context, Result};
use clap::Parser;
use kart_core::VehicleConstants;
use kart_sim::scenarios::ScenarioId;
use kart_sim::{ScenarioResult, ScenarioRunner};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Ticks between exported frames (6 frames per second at 60 Hz).
const EXPORT_INTERVAL_TICKS: u64 = 10;

/// KartNet Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "kart-sim")]
#[command(about = "Run deterministic replication scenarios for KartNet", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (baseline, high_latency, snapshot_loss, speed_hack, wall_impact, host_drive, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// One-way latency in milliseconds, overriding each scenario's own
    #[arg(long)]
    latency_ms: Option<u64>,

    /// JSON file with vehicle constants
    #[arg(long)]
    vehicle: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-frame poses of every role to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    if !args.json {
        info!("KartNet Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                bail!("{} (available: {}, all)", e, names.join(", "));
            }
        }
    };

    let vehicle = match &args.vehicle {
        Some(path) => load_vehicle(path)?,
        None => VehicleConstants::default(),
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("System clock before UNIX epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_vehicle(vehicle.clone());
        match args.latency_ms {
            Some(ms) => runner.with_latency_ms(ms),
            None => runner,
        }
    };

    // Handle --export mode for visualization
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            bail!("--export only supports a single scenario, not 'all'");
        }
        let scenario = scenarios[0];
        info!("Running with export to: {}", export_path);

        let (result, export) = runner_for(base_seed).run_recorded(scenario, EXPORT_INTERVAL_TICKS);
        export
            .write_to_file(export_path)
            .with_context(|| format!("Failed to write export to {}", export_path))?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                    "input_link": r.input_stats,
                    "snapshot_links": r.snapshot_stats,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);

            // List failed seeds
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn load_vehicle(path: &str) -> Result<VehicleConstants> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vehicle config {}", path))?;
    let vehicle = VehicleConstants::from_json_str(&json)
        .with_context(|| format!("Invalid vehicle config {}", path))?;
    Ok(vehicle)
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
        debug!("    {}", result.scenario.description());
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        error!("    {}", result.scenario.description());
    }
}
