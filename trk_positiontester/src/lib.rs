//! # trk Position Tester
//!
//! Producer-side test component: publishes a smooth random 2D trajectory
//! ([`RandomAccel2D`]) on a `Position2D` sink at a fixed sample period.

pub mod config;
pub mod model;

pub use config::PosigenConfig;
pub use model::RandomAccel2D;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use trk_common::config::ConfigError;
use trk_common::datatypes::Position2D;
use trk_shm::{Sink, Wait};

/// Publish `model` samples on `sink` until `count` samples are out, the node
/// ends, or `running` is cleared. Returns the number of samples published.
///
/// Samples are paced at `model.dt()` against a fixed schedule so a slow
/// consumer delays samples instead of shifting every later one. Before
/// returning, waits until readers have acknowledged the last sample.
///
/// # Errors
///
/// `ConfigError::ValidationError` if `model.dt()` is not a representable
/// period.
pub fn publish_loop(
    sink: &mut Sink<Position2D>,
    model: &mut RandomAccel2D,
    count: Option<u64>,
    running: &AtomicBool,
) -> Result<u64, ConfigError> {
    let period = Duration::try_from_secs_f64(model.dt()).map_err(|e| {
        ConfigError::ValidationError(format!("dt {} s is not a valid period: {e}", model.dt()))
    })?;
    let mut deadline = Instant::now();
    let mut published = 0u64;

    while running.load(Ordering::SeqCst) && count.is_none_or(|n| published < n) {
        if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(remaining);
        }

        match sink.wait() {
            Wait::Running(mut guard) => {
                *guard.retrieve() = model.step();
                guard.post();
                published += 1;
            }
            Wait::End => {
                debug!("Sink ended after {} samples", published);
                break;
            }
        }

        let Some(next) = deadline.checked_add(period) else {
            warn!("Sample schedule overflowed after {} samples", published);
            break;
        };
        deadline = next;
    }

    if published > 0 && !sink.drain() {
        debug!("Node ended before the last sample was acknowledged");
    }
    info!("Published {} samples", published);
    Ok(published)
}
