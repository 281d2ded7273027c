//! # trk_posicom
//!
//! Combines several position streams into their mean.
//!
//! Sources and sink come from the positional arguments
//! (`SOURCE... SINK`) or, when none are given, from the `[posicom]` table
//! (`--config-key`) of the `--config` file.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;
use trk_common::config::{SharedConfig, load_shared, load_table};
use trk_positioncombiner::{PosicomConfig, build, connect_with_backoff, request_shutdown};
use trk_shm::ShutdownHandle;

/// trk position combiner
#[derive(Parser, Debug)]
#[command(name = "trk_posicom")]
#[command(version)]
#[command(about = "Average several position streams into one")]
struct Args {
    /// Source addresses followed by the sink address (SOURCE... SINK).
    #[arg(value_name = "ADDRESS")]
    addresses: Vec<String>,

    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Table of the configuration file to use.
    #[arg(short = 'k', long, default_value = "posicom")]
    config_key: String,

    /// How long to wait for sources to appear, overrides the file.
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let shared = match &args.config {
        Some(path) => load_shared(path),
        None => Ok(None),
    };
    setup_tracing(&args, shared.as_ref().ok().and_then(Option::as_ref));

    let result = shared
        .map_err(Into::into)
        .and_then(|shared| run(&args, shared.as_ref()));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args, shared: Option<&SharedConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_table::<PosicomConfig>(path, &args.config_key)?,
        None => PosicomConfig::default(),
    };
    if !args.addresses.is_empty() {
        let cli = PosicomConfig::from_addresses(&args.addresses);
        config.sources = cli.sources;
        config.sink = cli.sink;
    }
    if let Some(ms) = args.connect_timeout_ms {
        config.connect_timeout_ms = ms;
    }
    config.validate()?;

    let name = config.name();
    match shared {
        Some(shared) => info!(
            "{} v{} starting in '{}'",
            name,
            env!("CARGO_PKG_VERSION"),
            shared.service_name
        ),
        None => info!("{} v{} starting", name, env!("CARGO_PKG_VERSION")),
    }

    let running = Arc::new(AtomicBool::new(true));
    let shutdown: Arc<OnceLock<ShutdownHandle>> = Arc::new(OnceLock::new());
    {
        let running = Arc::clone(&running);
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            if request_shutdown(&running, shutdown.get()) {
                // Still blocked on an idle upstream after the first request
                warn!("Second shutdown signal, exiting immediately");
                process::exit(130);
            }
        })?;
    }

    let mut combiner = build(&config);
    let timeout = Duration::from_millis(config.connect_timeout_ms);
    let Some(check) = connect_with_backoff(&mut combiner, timeout, &running)? else {
        return Ok(());
    };
    if let Some(handle) = combiner.shutdown_handle() {
        let _ = shutdown.set(handle);
    }
    info!(
        "{} running at {:.3} Hz{}",
        name,
        check.effective_rate_hz,
        if check.consistent { "" } else { " (rate-limited)" }
    );

    let mut cycles: u64 = 0;
    while running.load(Ordering::SeqCst) {
        if combiner.process() {
            break;
        }
        cycles += 1;
    }

    info!("{} exiting after {} samples", name, cycles);
    Ok(())
}

fn setup_tracing(args: &Args, shared: Option<&SharedConfig>) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        shared
            .and_then(|s| s.log_level.as_str().parse().ok())
            .unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
