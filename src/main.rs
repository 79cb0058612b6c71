//! input-gate CLI
//!
//! Intercepts system input and lets a host process veto it over stdin/stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use input_gate::{
    bridge::Bridge,
    capture::{check_permission, Capture},
    config::{Config, SourceConfig},
    metadata::platform_source,
    sink::LineWriter,
    VERSION,
};
use std::io::{self, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "input-gate")]
#[command(version = VERSION)]
#[command(about = "Input interception bridge with a host-side veto", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bridge on stdin/stdout
    Run {
        /// Input sources to capture (keyboard, mouse, or all)
        #[arg(long)]
        sources: Option<String>,

        /// How long the host has to answer, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Window metadata poll interval in seconds
        #[arg(long)]
        window_interval: Option<u64>,

        /// Also wait for a verdict on key presses
        #[arg(long)]
        block_keys: bool,

        /// Let pointer buttons through without asking the host
        #[arg(long)]
        no_block_pointer: bool,

        /// Log at debug level
        #[arg(long, short)]
        verbose: bool,
    },

    /// Check whether the event tap can be registered
    Check,

    /// Print window metadata as JSON
    Windows {
        /// List every on-screen window instead of the active one
        #[arg(long)]
        all: bool,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration back to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Run {
            sources,
            timeout_ms,
            window_interval,
            block_keys,
            no_block_pointer,
            verbose: _,
        } => cmd_run(RunOverrides {
            sources,
            timeout_ms,
            window_interval,
            block_keys,
            no_block_pointer,
        }),
        Commands::Check => cmd_check(),
        Commands::Windows { all } => cmd_windows(all),
        Commands::Config { write } => cmd_config(write),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .init();
}

struct RunOverrides {
    sources: Option<String>,
    timeout_ms: Option<u64>,
    window_interval: Option<u64>,
    block_keys: bool,
    no_block_pointer: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(sources) = self.sources {
            config.sources = SourceConfig::from_csv(&sources);
        }
        if let Some(ms) = self.timeout_ms {
            config.decision_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = self.window_interval {
            config.window_poll_interval = Duration::from_secs(secs);
        }
        if self.block_keys {
            config.blocking.keys = true;
        }
        if self.no_block_pointer {
            config.blocking.pointer_buttons = false;
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load config, using defaults: {e}");
            Config::default()
        }
    }
}

fn cmd_run(overrides: RunOverrides) -> Result<()> {
    let mut config = load_config();
    overrides.apply(&mut config);
    config.validate().context("invalid run configuration")?;

    info!(
        version = VERSION,
        keyboard = config.sources.keyboard,
        mouse = config.sources.mouse,
        block_pointer = config.blocking.pointer_buttons,
        block_keys = config.blocking.keys,
        "starting input-gate"
    );

    let sources = config.sources;
    let output = LineWriter::stdout().context("failed to start output writer")?;
    let bridge = Bridge::new(config, Arc::new(output), Arc::from(platform_source()));
    let threads = bridge
        .start(BufReader::new(io::stdin()))
        .context("failed to start bridge threads")?;

    let mut capture = Capture::new(bridge.handler(), sources);
    if let Err(e) = capture.start() {
        error!("Error starting capture: {e}");
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let mut capture_failed = false;
    while running.load(Ordering::SeqCst) {
        if !capture.is_running() {
            error!("Event tap stopped; shutting down");
            capture_failed = true;
            break;
        }
        if threads.host_closed() {
            info!("Host closed stdin; shutting down");
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    if let Err(e) = capture.stop() {
        warn!("Error stopping capture: {e}");
    }
    threads.stop();

    info!("{}", bridge.stats().summary());

    if capture_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_check() -> Result<()> {
    if check_permission() {
        println!("Event tap can be registered.");
        return Ok(());
    }

    eprintln!("Event tap could not be registered.");
    eprintln!();
    eprintln!("To grant permission:");
    eprintln!("1. Open System Settings > Privacy & Security > Accessibility");
    eprintln!("2. Add the terminal or host application to the allowed list");
    eprintln!("3. Restart the application");
    bail!("accessibility permission not granted");
}

fn cmd_windows(all: bool) -> Result<()> {
    let source = platform_source();
    let json = if all {
        serde_json::to_string_pretty(&source.all_windows())
    } else {
        serde_json::to_string_pretty(&source.active_window())
    }
    .context("failed to serialize window info")?;

    println!("{json}");
    Ok(())
}

fn cmd_config(write: bool) -> Result<()> {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("failed to serialize config")?
    );

    if write {
        config.save().context("failed to write config")?;
        println!();
        println!("Saved.");
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
