//! # rs-engine console
//!
//! Runs the command interpreter against the simulated motor boards, reading
//! one command line at a time from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Default configuration, calibration kept in ./calibration.bin
//! rs-engine-console
//!
//! # Faster time units and extra scripts
//! rs-engine-console --timeunit 100 --scripts scripts.json
//!
//! # Verbose JSON logs
//! rs-engine-console -v --json
//! ```
//!
//! An empty line repeats the previous command. Ctrl-C stops the motion in
//! progress; `exit` or end of input leaves the console.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use rs_engine::hal::{Bench, FileStore, MockBoard, StdClock, StdConsole};
use rs_engine::traits::{Interrupt, OperatorConsole};
use rs_engine::{AxleRegistry, Config, Interpreter, Script};

/// Command console for the calculating-engine testbed
#[derive(Parser, Debug)]
#[command(name = "rs-engine-console")]
#[command(version)]
#[command(about = "Motion scheduler and script interpreter console (simulated boards)")]
#[command(long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Calibration record file (overrides the configured path)
    #[arg(long, value_name = "FILE")]
    calibration: Option<PathBuf>,

    /// JSON file with additional scripts
    #[arg(long, value_name = "FILE")]
    scripts: Option<PathBuf>,

    /// Time unit in milliseconds
    #[arg(short, long, value_name = "MS")]
    timeunit: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

type Engine = Interpreter<Bench<MockBoard, StdConsole, StdClock>, FileStore>;

fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("rs-engine console v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;
    if let Some(ms) = args.timeunit {
        config.motion = config.motion.with_timeunit_ms(ms);
    }

    let calibration_path = args
        .calibration
        .clone()
        .unwrap_or_else(|| PathBuf::from(config.console.calibration_path.as_str()));

    let registry = AxleRegistry::prototype().context("prototype axle table")?;
    let board = MockBoard::simulating(&registry, &config.motion);
    let console = StdConsole::new();
    let interrupts = console.interrupt_handle();
    ctrlc::set_handler(move || interrupts.request(Interrupt::Stop))
        .context("installing Ctrl-C handler")?;

    let bench = Bench::new(board, console, StdClock::new());
    let store = FileStore::new(&calibration_path);
    let mut engine = Interpreter::with_registry(bench, store, config, registry);
    info!(
        path = %calibration_path.display(),
        calibrated = engine.calibration().calibrated(),
        "Calibration loaded"
    );

    if let Some(path) = &args.scripts {
        let scripts = load_scripts(path)?;
        info!(count = scripts.len(), "Scripts loaded");
        engine.library_mut().extend(scripts);
    }

    run(&mut engine)?;

    info!(cycles = engine.cycles(), "Console closed");
    Ok(())
}

fn run(engine: &mut Engine) -> Result<()> {
    let prompt = engine.config().console.prompt.clone();
    let repeat = engine.config().console.repeat_on_empty;
    let banner = engine.config().device.name.clone();
    engine.testbed_mut().console.write_line(banner.as_str());

    let mut previous = String::new();
    loop {
        let Some(line) = engine
            .testbed_mut()
            .console
            .read_command(prompt.as_str())
            .context("reading command")?
        else {
            return Ok(());
        };

        let line = if line.trim().is_empty() && repeat {
            previous.clone()
        } else {
            line
        };
        if matches!(line.trim(), "exit" | "quit") {
            return Ok(());
        }

        // a Ctrl-C at the prompt must not abort the next command
        let _ = engine.testbed_mut().console.poll_interrupt();

        if let Err(e) = engine.execute(&line) {
            debug!(error = %e, "Command failed");
        }
        previous = line;
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

fn load_scripts(path: &Path) -> Result<Vec<Script>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}
