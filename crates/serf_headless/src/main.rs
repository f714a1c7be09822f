//! Headless settlement session runner.
//!
//! This binary runs a session without graphics, controlled via JSON on
//! stdin/stdout. Designed for scripted play, save tooling and CI checks.
//!
//! # Usage
//!
//! ```bash
//! # Real-time mode - read commands from stdin while frames tick
//! cargo run -p serf_headless -- run --config run.ron
//!
//! # Script mode - apply a command file as fast as possible
//! cargo run -p serf_headless -- run --script commands.jsonl
//!
//! # Verify determinism and save round trips across parallel runs
//! cargo run -p serf_headless -- verify --runs 16 --ticks 20000
//!
//! # Print the spiral neighbour table
//! cargo run -p serf_headless -- spiral --radius 3
//!
//! # Summarize a save file
//! cargo run -p serf_headless -- inspect saves/save-1760600000_0.save
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for command/response format.

use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serf_core::spiral::spiral_pattern;
use serf_headless::{
    batch::{run_verify, VerifyConfig},
    config::HeadlessConfig,
    runner::{spawn_stdin_reader, HeadlessRunner},
    store::read_save,
};

#[derive(Parser)]
#[command(name = "serf_headless")]
#[command(about = "Headless settlement session runner for scripting and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session driven by JSON commands
    Run {
        /// RON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Apply commands from this file without wall-clock pacing
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Output state after every command and ticking frame
        #[arg(long)]
        auto_state: bool,

        /// Override the save directory
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Override the map size class
        #[arg(long)]
        map_size: Option<u32>,
    },

    /// Verify determinism by running the same session many times
    Verify {
        /// RON config file supplying the session settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of runs
        #[arg(short, long, default_value = "8")]
        runs: u32,

        /// Quanta per run
        #[arg(short, long, default_value = "5000")]
        ticks: u32,

        /// Serfs seeded per run
        #[arg(long, default_value = "64")]
        serfs: u32,

        /// Maximum parallel runs (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Write JSON results here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print spiral table offsets
    Spiral {
        /// Only entries within this many rings
        #[arg(short, long, default_value = "24")]
        radius: u32,
    },

    /// Summarize a save file
    Inspect {
        /// Save file path
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for protocol)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Some(Commands::Run {
            config,
            script,
            auto_state,
            save_dir,
            map_size,
        }) => cmd_run(config, script, auto_state, save_dir, map_size),
        Some(Commands::Verify {
            config,
            runs,
            ticks,
            serfs,
            parallel,
            output,
        }) => cmd_verify(config, runs, ticks, serfs, parallel, output),
        Some(Commands::Spiral { radius }) => cmd_spiral(radius),
        Some(Commands::Inspect { path }) => cmd_inspect(&path),
        None => cmd_run(None, None, false, None, None),
    }
}

fn load_config(path: Option<PathBuf>) -> HeadlessConfig {
    let Some(path) = path else {
        return HeadlessConfig::default();
    };
    match HeadlessConfig::load(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Loaded config");
            config
        }
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    }
}

/// Run a single session
fn cmd_run(
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    auto_state: bool,
    save_dir: Option<PathBuf>,
    map_size: Option<u32>,
) {
    let mut config = load_config(config);
    config.auto_state |= auto_state;
    if let Some(dir) = save_dir {
        config.save_dir = dir;
    }
    if let Some(size) = map_size {
        config.session.map_size = size;
    }

    let mut runner = match HeadlessRunner::from_config(&config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Failed to start session: {e}");
            std::process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = match script {
        Some(path) => {
            tracing::info!(script = %path.display(), "Running script");
            match std::fs::File::open(&path) {
                Ok(file) => runner.run_script(BufReader::new(file), &mut out),
                Err(e) => {
                    eprintln!("Failed to open script {}: {e}", path.display());
                    std::process::exit(1);
                }
            }
        }
        None => {
            tracing::info!("Starting real-time session");
            runner.run_realtime(&spawn_stdin_reader(), &mut out)
        }
    };

    if let Err(e) = result {
        eprintln!("Session aborted: {e}");
        std::process::exit(1);
    }
}

/// Verify determinism across parallel runs
fn cmd_verify(
    config: Option<PathBuf>,
    runs: u32,
    ticks: u32,
    serfs: u32,
    parallel: u32,
    output: Option<PathBuf>,
) {
    let session = load_config(config).session;
    let results = run_verify(VerifyConfig {
        session,
        runs,
        ticks,
        serfs,
        parallel,
        ..VerifyConfig::default()
    });

    if let Some(path) = output {
        match results.save(&path) {
            Ok(()) => eprintln!("Results saved to: {}", path.display()),
            Err(e) => eprintln!("Failed to save results: {e}"),
        }
    }

    for error in &results.errors {
        eprintln!("Run {} failed: {}", error.run, error.message);
    }
    if results.passed() {
        eprintln!(
            "PASS: All {} runs produced identical results ({:016x})",
            results.runs.len(),
            results.runs[0].hash
        );
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        eprintln!("  Unique hashes: {:016x?}", results.unique_hashes());
        std::process::exit(1);
    }
}

/// Print spiral entries as `index ring dx dy`
fn cmd_spiral(radius: u32) {
    let pattern = spiral_pattern();
    let count = pattern.entries_within(radius);
    println!("# {count} entries within {radius} rings");
    for (index, (dx, dy)) in pattern.offsets().iter().take(count).enumerate() {
        let ring = pattern.ring_of(index).unwrap_or_default();
        println!("{index:>3} {ring:>2} {dx:>3} {dy:>3}");
    }
}

/// Print a JSON summary of a save file
fn cmd_inspect(path: &std::path::Path) {
    let file = match read_save(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to read save: {e}");
            std::process::exit(1);
        }
    };

    let snapshot = &file.snapshot;
    let summary = serde_json::json!({
        "version": file.version,
        "cols": snapshot.geometry.cols(),
        "rows": snapshot.geometry.rows(),
        "tick": snapshot.clock.tick,
        "speed_bits": snapshot.clock.speed.to_bits(),
        "serfs": snapshot.serfs.records.len(),
        "flags": snapshot.flags.records.len(),
        "buildings": snapshot.buildings.records.len(),
        "inventories": snapshot.inventories.records.len(),
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to format summary: {e}");
            std::process::exit(1);
        }
    }
}
