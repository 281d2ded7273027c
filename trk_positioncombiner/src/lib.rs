//! # trk Position Combiner
//!
//! Fan-in component: reads `Position2D` samples from several upstream
//! producers, averages them with [`MeanPosition`] and publishes the result on
//! one sink. Runs at the rate of the slowest source.

pub mod config;
pub mod mean;

pub use config::PosicomConfig;
pub use mean::MeanPosition;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use trk_common::datatypes::Position2D;
use trk_shm::{FanIn, RateCheck, ShmError, ShmResult, ShutdownHandle};

/// The combiner's fan-in type.
pub type PositionCombiner = FanIn<Position2D, MeanPosition>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Combiner for `config`, not yet connected.
pub fn build(config: &PosicomConfig) -> PositionCombiner {
    FanIn::new(
        config.sources.as_slice(),
        &config.sink,
        MeanPosition::new(&config.sink),
    )
}

/// Connect to every source, retrying with exponential backoff while any of
/// them is not bound yet.
///
/// Gives up with the last [`ShmError::NotFound`] once `timeout` has elapsed.
/// Returns `Ok(None)` if `running` is cleared while waiting.
pub fn connect_with_backoff(
    combiner: &mut PositionCombiner,
    timeout: Duration,
    running: &AtomicBool,
) -> ShmResult<Option<RateCheck>> {
    let start = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match combiner.connect_to_nodes() {
            Ok(check) => return Ok(Some(check)),
            Err(ShmError::NotFound { address }) => {
                if start.elapsed() >= timeout {
                    return Err(ShmError::NotFound { address });
                }
                debug!("Waiting for '{}' (retry in {:?})", address, backoff);
            }
            Err(e) => return Err(e),
        }

        std::thread::sleep(backoff);
        if !running.load(Ordering::SeqCst) {
            info!("Interrupted while connecting");
            return Ok(None);
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Record a shutdown request: clear `running` and end the output node if it
/// is bound.
///
/// Returns `true` if a request was already pending, i.e. the first one did
/// not get the combiner out of a blocked upstream `wait()`.
pub fn request_shutdown(running: &AtomicBool, output: Option<&ShutdownHandle>) -> bool {
    let repeated = !running.swap(false, Ordering::SeqCst);
    if let Some(handle) = output {
        handle.shutdown();
    }
    repeated
}
