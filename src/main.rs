//! Home energy simulator entry point: CLI wiring and config-driven engine
//! construction.

use std::path::Path;
use std::process;
use std::sync::Arc;

use home_energy_sim::analytics::TelemetryStatistics;
use home_energy_sim::config::ScenarioConfig;
use home_energy_sim::io::export::export_csv;
use home_energy_sim::sim::Engine;
use tracing_subscriber::EnvFilter;

/// Ticks run headless when neither `--ticks` nor `--serve` is given: one
/// simulated day at the default cadence.
const DEFAULT_TICKS: u64 = 24 * 60;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    ticks: Option<u64>,
    history_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("home-energy-sim: residential battery, solar, and EV telemetry simulator");
    eprintln!();
    eprintln!("Usage: home-energy-sim [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset (demo, single)");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --ticks <n>              Run n ticks headless and print final snapshots");
    eprintln!("  --history-out <path>     Export retained history to CSV after the run");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start the live API server");
        eprintln!("  --port <u16>             API server port (default: 8000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the demo preset is used.");
    eprintln!("Set RUST_LOG to adjust log verbosity (default: info).");
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str, what: &str) -> &'a str {
    match args.get(i) {
        Some(v) => v,
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, flag: &str, what: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{raw}\" is not a valid {what}");
        process::exit(1);
    })
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        ticks: None,
        history_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 8000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path =
                    Some(value_of(&args, i, "--scenario", "a path argument").into());
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(value_of(&args, i, "--preset", "a name argument").into());
            }
            "--seed" => {
                i += 1;
                let raw = value_of(&args, i, "--seed", "a u64 argument");
                cli.seed_override = Some(parse_number(raw, "--seed", "u64"));
            }
            "--ticks" => {
                i += 1;
                let raw = value_of(&args, i, "--ticks", "a u64 argument");
                cli.ticks = Some(parse_number(raw, "--ticks", "u64"));
            }
            "--history-out" => {
                i += 1;
                cli.history_out =
                    Some(value_of(&args, i, "--history-out", "a path argument").into());
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                let raw = value_of(&args, i, "--port", "a u16 argument");
                cli.port = parse_number(raw, "--port", "u16");
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_scenario(cli: &CliArgs) -> ScenarioConfig {
    // --scenario takes priority, then --preset, then the demo default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::demo())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    scenario
}

/// Runs `ticks` ticks back to back and prints per-device results.
fn run_headless(engine: &Engine, ticks: u64) {
    for _ in 0..ticks {
        let report = engine.tick();
        for id in &report.faulted {
            eprintln!("warning: device {id} faulted at tick {}", report.tick);
        }
    }

    for device in engine.list_devices() {
        let Ok(latest) = engine.latest_snapshot(&device.id) else {
            continue;
        };
        println!("{latest}");
        let history = engine
            .query(&device.id, None, None, None)
            .unwrap_or_default();
        if let Some(stats) =
            TelemetryStatistics::from_snapshots(&history, device.battery_capacity_kwh)
        {
            println!("{stats}\n");
        }
    }
}

fn export_history(engine: &Engine, path: &str) {
    let mut snapshots = Vec::new();
    for device in engine.list_devices() {
        snapshots.extend(
            engine
                .query(&device.id, None, None, None)
                .unwrap_or_default(),
        );
    }
    if let Err(e) = export_csv(&snapshots, Path::new(path)) {
        eprintln!("error: failed to write CSV: {e}");
        process::exit(1);
    }
    eprintln!("History written to {path}");
}

#[cfg(feature = "api")]
fn serve(engine: Arc<Engine>, port: u16) {
    use std::net::SocketAddr;

    use home_energy_sim::api::{self, AppState};
    use home_energy_sim::sim::TickScheduler;

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });
    rt.block_on(async move {
        let scheduler = TickScheduler::new(Arc::clone(&engine)).spawn();
        let state = Arc::new(AppState::new(engine));
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        };
        if let Err(e) = api::serve(state, addr, shutdown).await {
            eprintln!("error: API server failed: {e}");
        }
        let ticks = scheduler.shutdown().await;
        tracing::info!(ticks, "simulation stopped");
    });
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();
    let scenario = load_scenario(&cli);

    let engine = Engine::with_devices(scenario.to_sim_config(), scenario.to_devices())
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        });
    let engine = Arc::new(engine);

    #[cfg(feature = "api")]
    let serving = cli.serve;
    #[cfg(not(feature = "api"))]
    let serving = false;

    let ticks = cli
        .ticks
        .unwrap_or(if serving { 0 } else { DEFAULT_TICKS });
    if ticks > 0 {
        run_headless(&engine, ticks);
    }

    if let Some(ref path) = cli.history_out {
        export_history(&engine, path);
    }

    #[cfg(feature = "api")]
    if cli.serve {
        serve(engine, cli.port);
    }
}
