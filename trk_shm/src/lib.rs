//! # trk shared-memory dataflow core
//!
//! Independent processes of the tracking pipeline exchange typed samples
//! through shared memory segments. Each segment holds one [`Node`] header and
//! one payload slot of a fixed [`Payload`](trk::shm::payload::Payload) type.
//! A [`Sink`] owns the segment and publishes; any number of [`Source`]s
//! attach and consume. There is no central scheduler: the handshake in the
//! node alone orders the dataflow.
//!
//! ## Handshake
//!
//! ```text
//!  Sink                                   Source (each)
//!  wait()  -- blocks until all ack  -->
//!  retrieve() = value
//!  post()  -- epoch += 1, wake -------->  wait()  -- blocks for new epoch
//!                                         clone()
//!          <-------- ack -------------    post()
//! ```
//!
//! - The producer never overwrites a sample a registered reader has not
//!   acknowledged, and readers never observe a partially written payload.
//! - Delivery is latest-value: a reader sees each sample at most once and
//!   a reader that registers late starts at the next sample.
//! - `END` (sink dropped, `Sink::end()`, a [`ShutdownHandle`], or owner
//!   death) wakes every waiter; every later `wait()` returns [`Wait::End`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trk_shm::{Sink, Source, Wait};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Producer process
//! let mut sink = Sink::<[f64; 4]>::new(1.0 / 30.0)?;
//! sink.bind("camera0.state")?;
//! if let Wait::Running(mut guard) = sink.wait() {
//!     *guard.retrieve() = [1.0, 2.0, 3.0, 4.0];
//!     guard.post();
//! }
//!
//! // Consumer process
//! let mut source = Source::<[f64; 4]>::new();
//! source.touch("camera0.state")?;
//! source.connect()?;
//! while let Wait::Running(guard) = source.wait() {
//!     let state = guard.clone();
//!     guard.post();
//!     println!("{state:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Binding, attaching and registering return [`ShmResult`]. Every error is
//! fatal to the calling component; the only retry the core anticipates is a
//! caller re-running `Source::connect()` on [`ShmError::NotFound`]:
//!
//! ```rust,no_run
//! use trk_shm::{ShmError, Source};
//! use std::time::Duration;
//!
//! let mut source = Source::<u64>::new();
//! source.touch("upstream").unwrap();
//! loop {
//!     match source.connect() {
//!         Ok(()) => break,
//!         Err(ShmError::NotFound { .. }) => std::thread::sleep(Duration::from_millis(50)),
//!         Err(e) => panic!("{e}"),
//!     }
//! }
//! ```
//!
//! ## Platform Support
//!
//! Linux: tmpfs backing files under `/dev/shm`, process-shared futexes.
//! Other Unix targets fall back to sleep-polling on the same words.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod fanin;
pub mod node;
pub mod platform;
pub mod rate;
pub mod segment;
pub mod sink;
pub mod source;

pub use error::{ShmError, ShmResult};
pub use fanin::{Combine, FanIn};
pub use node::{Node, NodeState, Sample, Wait};
pub use rate::{RateCheck, RateError, check_sample_periods};
pub use segment::{AttachedSegment, OwnedSegment, segment_path, validate_address};
pub use sink::{ShutdownHandle, Sink, WriteGuard};
pub use source::{NamedSource, ReadGuard, Source};

/// Initialize a `tracing` subscriber driven by `RUST_LOG`.
///
/// For tests and embedders; the executables install their own.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
