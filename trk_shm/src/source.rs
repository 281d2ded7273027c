//! Consumer side of the handshake.

use crate::error::{ShmError, ShmResult};
use crate::node::{NodeState, Sample, Wait};
use crate::platform::get_current_pid;
use crate::segment::{AttachedSegment, Mapping, validate_address};
use std::marker::PhantomData;
use tracing::{debug, info};
use trk::shm::consts::{LIVENESS_POLL, MAX_READERS};
use trk::shm::payload::Payload;

/// Registered reader of one node.
///
/// `touch()` records the address (and registers early if the sink is already
/// bound); `connect()` completes attachment. Both are idempotent. Dropping a
/// source releases its reader slot and any acknowledgement it still owes.
pub struct Source<T: Payload> {
    address: Option<String>,
    segment: Option<AttachedSegment<T>>,
    slot: usize,
    seen_epoch: u64,
    connected: bool,
}

impl<T: Payload> Default for Source<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Source<T> {
    /// Source with no address.
    pub fn new() -> Self {
        Self {
            address: None,
            segment: None,
            slot: 0,
            seen_epoch: 0,
            connected: false,
        }
    }

    /// Record `address` and register on it if the sink has already bound.
    ///
    /// A missing segment is not an error here; `connect()` reports it.
    pub fn touch(&mut self, address: &str) -> ShmResult<()> {
        validate_address(address)?;
        match &self.address {
            Some(current) if current == address => {}
            Some(current) => {
                return Err(ShmError::AlreadyBound {
                    address: current.clone(),
                });
            }
            None => self.address = Some(address.to_string()),
        }
        match self.attach() {
            Ok(()) | Err(ShmError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Attach and register if `touch()` could not, then mark the node
    /// RUNNING.
    ///
    /// Fails with [`ShmError::NotFound`] while no sink is bound; retrying is
    /// up to the caller.
    pub fn connect(&mut self) -> ShmResult<()> {
        if self.address.is_none() {
            return Err(ShmError::NotTouched);
        }
        self.attach()?;
        if let Some(segment) = &self.segment
            && !self.connected
        {
            segment.node().advance(NodeState::Running);
            self.connected = true;
            info!(
                "Source connected to '{}' (slot {}, period {} s)",
                segment.address(),
                self.slot,
                segment.node().period_sec()
            );
        }
        Ok(())
    }

    fn attach(&mut self) -> ShmResult<()> {
        if self.segment.is_some() {
            return Ok(());
        }
        let Some(address) = self.address.as_deref() else {
            return Err(ShmError::NotTouched);
        };
        let segment = AttachedSegment::<T>::attach(address)?;
        let (slot, epoch) =
            segment
                .node()
                .register(get_current_pid())
                .ok_or_else(|| ShmError::ReaderLimit {
                    address: address.to_string(),
                    max: MAX_READERS,
                })?;
        debug!(
            "Registered on '{}' in slot {} at sample {}",
            address, slot, epoch
        );
        self.slot = slot;
        self.seen_epoch = epoch;
        self.segment = Some(segment);
        Ok(())
    }

    /// Recorded address.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// `true` after a successful `connect()`.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Node state, `None` while not attached.
    pub fn state(&self) -> Option<NodeState> {
        self.segment.as_ref().map(|s| s.node().state())
    }

    /// Metadata of the latest published sample.
    pub fn retrieve(&self) -> ShmResult<Sample> {
        match (&self.address, &self.segment) {
            (None, _) => Err(ShmError::NotTouched),
            (Some(address), None) => Err(ShmError::NotFound {
                address: address.clone(),
            }),
            (Some(_), Some(segment)) => Ok(segment.node().sample()),
        }
    }

    /// Block until a sample newer than the last consumed one is published.
    ///
    /// Returns immediately if one is already pending. A source that is not
    /// attached has nothing to consume and reports `End`.
    pub fn wait(&mut self) -> Wait<ReadGuard<'_, T>> {
        let Some(segment) = &self.segment else {
            debug!("wait() on a detached source");
            return Wait::End;
        };
        match segment
            .node()
            .wait_published(self.seen_epoch, LIVENESS_POLL)
        {
            Some(epoch) => Wait::Running(ReadGuard {
                map: segment.mapping(),
                slot: self.slot,
                epoch,
                seen_epoch: &mut self.seen_epoch,
                posted: false,
                _marker: PhantomData,
            }),
            None => {
                debug!("Source '{}' observed END", segment.address());
                Wait::End
            }
        }
    }
}

impl<T: Payload> Drop for Source<T> {
    fn drop(&mut self) {
        if let Some(segment) = &self.segment {
            segment.node().unregister(self.slot);
            debug!("Released slot {} on '{}'", self.slot, segment.address());
        }
    }
}

/// Read access to one published sample, between `Source::wait()` and
/// `post()`. Dropping the guard posts.
pub struct ReadGuard<'a, T: Payload> {
    map: &'a Mapping,
    slot: usize,
    epoch: u64,
    seen_epoch: &'a mut u64,
    posted: bool,
    _marker: PhantomData<&'a T>,
}

impl<T: Payload> ReadGuard<'_, T> {
    /// Copy of the payload.
    #[allow(clippy::should_implement_trait)]
    pub fn clone(&self) -> T {
        // SAFETY: the sink does not write again until this reader posts.
        unsafe { self.map.payload::<T>().read() }
    }

    /// Epoch of the sample being read.
    pub fn sample_number(&self) -> u64 {
        self.epoch
    }

    /// Acknowledge the sample; the sink may proceed once every reader has.
    pub fn post(mut self) {
        self.acknowledge();
    }

    fn acknowledge(&mut self) {
        if !self.posted {
            self.posted = true;
            *self.seen_epoch = self.epoch;
            self.map.node().acknowledge(self.slot);
        }
    }
}

impl<T: Payload> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.acknowledge();
    }
}

/// A source paired with a logical name for diagnostics.
pub struct NamedSource<T: Payload> {
    /// Logical name
    pub name: String,
    /// The source
    pub source: Source<T>,
}

impl<T: Payload> NamedSource<T> {
    /// Unconnected source named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Source::new(),
        }
    }
}
