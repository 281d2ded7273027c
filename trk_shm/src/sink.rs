//! Producer side of the handshake.

use crate::error::{ShmError, ShmResult};
use crate::node::{NodeState, Wait};
use crate::platform::monotonic_ns;
use crate::segment::{Mapping, OwnedSegment};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};
use trk::shm::consts::LIVENESS_POLL;
use trk::shm::payload::Payload;

/// Owner of one node: writes the payload slot and publishes epochs.
///
/// ```rust,no_run
/// use trk_shm::{Sink, Wait};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut sink = Sink::<u64>::new(0.02)?;
/// sink.bind("counter")?;
/// for n in 0.. {
///     let Wait::Running(mut guard) = sink.wait() else { break };
///     *guard.retrieve() = n;
///     guard.post();
/// }
/// # Ok(())
/// # }
/// ```
pub struct Sink<T: Payload> {
    period_sec: f64,
    segment: Option<OwnedSegment<T>>,
}

impl<T: Payload> Sink<T> {
    /// Unbound sink publishing every `period_sec` seconds.
    pub fn new(period_sec: f64) -> ShmResult<Self> {
        if !period_sec.is_finite() || period_sec <= 0.0 {
            return Err(ShmError::InvalidPeriod { period_sec });
        }
        Ok(Self {
            period_sec,
            segment: None,
        })
    }

    /// Create the segment at `address`. The node starts in INIT with the
    /// payload slot set to `T::default()`.
    pub fn bind(&mut self, address: &str) -> ShmResult<()> {
        if let Some(segment) = &self.segment {
            return Err(ShmError::AlreadyBound {
                address: segment.address().to_string(),
            });
        }
        self.segment = Some(OwnedSegment::create(address, self.period_sec)?);
        info!("Sink bound to '{}'", address);
        Ok(())
    }

    /// Bound address.
    pub fn address(&self) -> Option<&str> {
        self.segment.as_ref().map(|s| s.address())
    }

    /// Sample period in seconds.
    pub fn period_sec(&self) -> f64 {
        self.period_sec
    }

    /// Node state, `None` while unbound.
    pub fn state(&self) -> Option<NodeState> {
        self.segment.as_ref().map(|s| s.node().state())
    }

    /// Registered readers.
    pub fn reader_count(&self) -> u32 {
        self.segment.as_ref().map_or(0, |s| s.node().reader_count())
    }

    /// Readers that have not yet acknowledged the latest sample.
    pub fn pending_acks(&self) -> u32 {
        self.segment.as_ref().map_or(0, |s| s.node().pending_acks())
    }

    /// Epochs published so far.
    pub fn sample_number(&self) -> u64 {
        self.segment.as_ref().map_or(0, |s| s.node().epoch())
    }

    /// Block until every reader has acknowledged the previous epoch.
    ///
    /// Returns a write guard, or [`Wait::End`] once the node has ended. An
    /// unbound sink has nowhere to publish and reports `End`.
    pub fn wait(&mut self) -> Wait<WriteGuard<'_, T>> {
        let Some(segment) = &self.segment else {
            debug!("wait() on an unbound sink");
            return Wait::End;
        };
        if segment.node().wait_drained(LIVENESS_POLL) {
            Wait::Running(WriteGuard {
                map: segment.mapping().as_ref(),
                posted: false,
                _marker: PhantomData,
            })
        } else {
            Wait::End
        }
    }

    /// Move the node to END and wake every waiter. The segment stays mapped
    /// until the sink is dropped.
    pub fn end(&self) {
        if let Some(segment) = &self.segment
            && segment.node().end()
        {
            info!("Sink '{}' ended", segment.address());
        }
    }

    /// Block until every reader has acknowledged the latest sample, without
    /// opening a new write window.
    ///
    /// Returns `false` if the sink is unbound or the node ended first. Call
    /// before dropping the sink so readers do not miss the final sample.
    pub fn drain(&self) -> bool {
        self.segment
            .as_ref()
            .is_some_and(|s| s.node().wait_drained(LIVENESS_POLL))
    }

    /// Handle that can end this sink's node from another thread, e.g. a
    /// signal handler.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.segment.as_ref().map(|s| ShutdownHandle {
            map: Arc::clone(s.mapping()),
        })
    }
}

/// Exclusive access to the payload slot between `Sink::wait()` and `post()`.
///
/// Dropping the guard posts.
pub struct WriteGuard<'a, T: Payload> {
    map: &'a Mapping,
    posted: bool,
    _marker: PhantomData<&'a mut T>,
}

impl<T: Payload> WriteGuard<'_, T> {
    /// The payload slot.
    pub fn retrieve(&mut self) -> &mut T {
        // SAFETY: wait() returned only after every registered reader released
        // the previous epoch, and readers never read before the next publish.
        unsafe { &mut *self.map.payload::<T>() }
    }

    /// Publish the written payload as the next epoch and wake all readers.
    pub fn post(mut self) {
        self.publish();
    }

    fn publish(&mut self) {
        if !self.posted {
            self.posted = true;
            self.map.node().publish(monotonic_ns());
        }
    }
}

impl<T: Payload> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.publish();
    }
}

/// Ends a sink's node from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    map: Arc<Mapping>,
}

impl ShutdownHandle {
    /// Move the node to END. Idempotent.
    pub fn shutdown(&self) {
        if self.map.node().end() {
            info!("Node ended by shutdown handle");
        }
    }
}
