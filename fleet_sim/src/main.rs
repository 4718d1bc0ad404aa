//! Survey Fleet Simulator CLI
//!
//! Runs deterministic fleet scenarios, or the fleet in real time with `--live`.

use clap::Parser;
use fleet_core::{FleetConfig, FleetSeed};
use fleet_sim::scenarios::ScenarioId;
use fleet_sim::{run_live, LiveOptions, ScenarioResult, ScenarioRunner};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Survey Fleet Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "fleet-sim")]
#[command(about = "Run the survey fleet simulator", long_about = None)]
struct Args {
    /// sled database directory used by --live
    #[arg(long, default_value = "fleet.db")]
    db: PathBuf,

    /// JSON config file (missing fields keep their defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON fleet seed file (defaults to the built-in North Sea fleet)
    #[arg(long)]
    fleet: Option<PathBuf>,

    /// Scenario to run (patrol, time_warp, depletion, reset_race, restart, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Duration in seconds (virtual for scenarios, wall-clock for --live)
    #[arg(short, long, default_value = "3600")]
    duration: f64,

    /// Speed multiplier, 0.1 to 10.0
    #[arg(short, long, default_value = "1.0")]
    multiplier: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Run the fleet in real time against --db instead of scenarios
    #[arg(long)]
    live: bool,
}

fn exit_with(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Survey Fleet Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = match &args.config {
        Some(path) => FleetConfig::from_json_file(path).unwrap_or_else(|e| exit_with(&e.to_string())),
        None => FleetConfig::default(),
    };
    let fleet = match &args.fleet {
        Some(path) => FleetSeed::from_json_file(path).unwrap_or_else(|e| exit_with(&e.to_string())),
        None => FleetSeed::default_fleet(),
    };

    if args.live {
        let options = LiveOptions {
            db_path: args.db.clone(),
            duration: Duration::from_secs_f64(args.duration.max(0.0)),
            multiplier: args.multiplier,
        };
        match run_live(options, config, fleet).await {
            Ok(summary) => info!("✓ live run complete ({} ticks)", summary.ticks),
            Err(e) => {
                error!("✗ live run failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e: String| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: patrol, time_warp, depletion, reset_race, restart, all");
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let runner = ScenarioRunner::new(seed)
        .with_duration(args.duration)
        .with_multiplier(args.multiplier)
        .with_config(config)
        .with_fleet(fleet);

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            exit_with("--export only supports a single scenario, not 'all'");
        }

        let (result, export) = runner.run_with_export(scenarios[0], 1).await;
        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
        } else {
            info!("Exported {} frames to {}", export.frames.len(), export_path.display());
        }

        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = runner.run(*scenario).await;
        if !args.json {
            report(&result);
        }
        all_results.push(result);
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
                    "vessels": r.final_vessel_count,
                    "arrivals": r.metrics.arrivals,
                    "stale_writes": r.metrics.stale_writes,
                    "resets": r.metrics.resets,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => exit_with(&e.to_string()),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("✓ {} (seed={}) PASSED", result.scenario.name(), result.seed);
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
