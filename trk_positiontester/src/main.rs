//! # trk_posigen
//!
//! Publishes a randomly accelerating 2D position for exercising downstream
//! components without a camera.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;
use trk_common::config::{SharedConfig, load_shared, load_table};
use trk_common::datatypes::Position2D;
use trk_positiontester::{PosigenConfig, RandomAccel2D, publish_loop};
use trk_shm::Sink;

/// trk position tester
#[derive(Parser, Debug)]
#[command(name = "trk_posigen")]
#[command(version)]
#[command(about = "Publish a random-acceleration test trajectory")]
struct Args {
    /// Address to publish positions on.
    sink: String,

    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Table of the configuration file to use.
    #[arg(short = 'k', long, default_value = "posigen")]
    config_key: String,

    /// Sample period in seconds, overrides the file.
    #[arg(long)]
    dt: Option<f64>,

    /// Stop after this many samples.
    #[arg(long)]
    count: Option<u64>,

    /// RNG seed for a reproducible trajectory.
    #[arg(long)]
    seed: Option<u64>,

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
        Some(path) => load_table::<PosigenConfig>(path, &args.config_key)?,
        None => PosigenConfig::default(),
    };
    if let Some(dt) = args.dt {
        config.dt = dt;
    }
    if args.count.is_some() {
        config.count = args.count;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;

    info!(
        "posigen[{}] v{} starting{}: dt={} s, accel sd={}",
        args.sink,
        env!("CARGO_PKG_VERSION"),
        shared.map_or(String::new(), |s| format!(" in '{}'", s.service_name)),
        config.dt,
        config.accel
    );

    let mut sink = Sink::<Position2D>::new(config.dt)?;
    sink.bind(&args.sink)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let shutdown = sink.shutdown_handle();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
            if let Some(handle) = &shutdown {
                handle.shutdown();
            }
        })?;
    }

    let mut model = RandomAccel2D::new(config.dt, config.accel, config.seed, &args.sink)?;
    publish_loop(&mut sink, &mut model, config.count, &running)?;

    info!("posigen[{}] exiting", args.sink);
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
