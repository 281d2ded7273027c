//! Node header: the synchronization state shared by one Sink and its Sources.
//!
//! The header sits at offset 0 of every segment. All fields are atomics so the
//! zero-filled bytes of a freshly sized file are already a valid (not yet
//! ready) `Node`, and so that any process can observe any field without a
//! data race. Membership and acknowledgement bookkeeping is done under a small
//! futex mutex; waiting is done on two sequence words, one per direction.
//!
//! ```text
//!  Sink                         Node                        Source (slot k)
//!  ----                         ----                        ---------------
//!  wait(): pending == 0 ?  <--  ack_seq ++ when drained <--  post(): pending &= !k
//!  post(): pending = registered
//!          epoch += 1
//!          publish_seq ++  -->  wakes all              -->  wait(): epoch > seen ?
//! ```

use crate::platform::{futex_wait, futex_wake_all, futex_wake_one, is_process_alive};
use static_assertions::const_assert;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use trk::shm::consts::{CACHE_LINE_SIZE, MAX_READERS, TRK_NODE_MAGIC};

/// Lifecycle state of a node. Transitions are monotonic: `Init < Running < End`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    /// Bound, nothing published or consumed yet
    Init = 0,
    /// Data is flowing
    Running = 1,
    /// Terminal: the owner ended the node or died
    End = 2,
}

impl NodeState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => NodeState::Init,
            1 => NodeState::Running,
            _ => NodeState::End,
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeState::Init => "INIT",
            NodeState::Running => "RUNNING",
            NodeState::End => "END",
        };
        f.write_str(s)
    }
}

/// Outcome of a blocking `wait()` on either side of the handshake.
///
/// `Running` carries the guard that grants access to the payload slot; the
/// guard's release performs `post()`. `End` means the node has terminated and
/// nothing more will be published.
#[derive(Debug)]
#[must_use = "a Running guard must be used or dropped to post the epoch"]
pub enum Wait<G> {
    /// The node is live; use the guard, then post
    Running(G),
    /// The node has ended
    End,
}

impl<G> Wait<G> {
    /// `true` for [`Wait::End`].
    pub fn is_end(&self) -> bool {
        matches!(self, Wait::End)
    }

    /// Guard if running.
    pub fn running(self) -> Option<G> {
        match self {
            Wait::Running(guard) => Some(guard),
            Wait::End => None,
        }
    }
}

/// Metadata of the latest published sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Epoch of the sample; 0 before the first publish
    pub sample_number: u64,
    /// Producer's sample period in seconds
    pub period_sec: f64,
    /// CLOCK_MONOTONIC nanoseconds at publish; 0 before the first publish
    pub timestamp_ns: u64,
}

/// Reader slot: the PID of the process holding it, 0 when free.
#[repr(C)]
pub struct ReaderSlot {
    pid: AtomicU32,
}

/// Shared node header.
#[repr(C, align(64))]
pub struct Node {
    magic: AtomicU64,
    ready: AtomicU32,
    version_hash: AtomicU32,
    payload_size: AtomicU64,
    owner_pid: AtomicU32,
    state: AtomicU32,
    lock: AtomicU32,
    publish_seq: AtomicU32,
    ack_seq: AtomicU32,
    _reserved: AtomicU32,
    epoch: AtomicU64,
    period_bits: AtomicU64,
    timestamp_ns: AtomicU64,
    registered: AtomicU64,
    pending: AtomicU64,
    readers: [ReaderSlot; MAX_READERS],
}

const_assert!(std::mem::align_of::<Node>() == CACHE_LINE_SIZE);
const_assert!(std::mem::size_of::<Node>() % CACHE_LINE_SIZE == 0);
const_assert!(MAX_READERS <= u64::BITS as usize);

impl Node {
    /// Fill in a zeroed header. Owner only, before [`Node::mark_ready`].
    pub(crate) fn init(
        &self,
        owner_pid: u32,
        version_hash: u32,
        payload_size: u64,
        period_sec: f64,
    ) {
        self.magic.store(TRK_NODE_MAGIC, Ordering::Relaxed);
        self.version_hash.store(version_hash, Ordering::Relaxed);
        self.payload_size.store(payload_size, Ordering::Relaxed);
        self.owner_pid.store(owner_pid, Ordering::Relaxed);
        self.state.store(NodeState::Init as u32, Ordering::Relaxed);
        self.period_bits.store(period_sec.to_bits(), Ordering::Relaxed);
    }

    /// Publish the header to attaching processes. Everything written before
    /// this call is visible to a process that observes [`Node::is_ready`].
    pub(crate) fn mark_ready(&self) {
        self.ready.store(1, Ordering::Release);
    }

    /// Header initialized by a live or past owner.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) == 1
            && self.magic.load(Ordering::Relaxed) == TRK_NODE_MAGIC
    }

    /// Layout hash of the payload type recorded by the owner.
    pub fn version_hash(&self) -> u32 {
        self.version_hash.load(Ordering::Relaxed)
    }

    /// Payload size in bytes recorded by the owner.
    pub fn payload_size(&self) -> u64 {
        self.payload_size.load(Ordering::Relaxed)
    }

    /// PID of the owning (Sink) process.
    pub fn owner_pid(&self) -> u32 {
        self.owner_pid.load(Ordering::Relaxed)
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        NodeState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Sample period in seconds; immutable after bind.
    pub fn period_sec(&self) -> f64 {
        f64::from_bits(self.period_bits.load(Ordering::Relaxed))
    }

    /// Number of epochs published so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Metadata of the latest sample.
    pub fn sample(&self) -> Sample {
        Sample {
            sample_number: self.epoch(),
            period_sec: self.period_sec(),
            timestamp_ns: self.timestamp_ns.load(Ordering::Relaxed),
        }
    }

    /// Number of registered readers.
    pub fn reader_count(&self) -> u32 {
        self.registered.load(Ordering::Acquire).count_ones()
    }

    /// Number of readers that have not yet acknowledged the current epoch.
    pub fn pending_acks(&self) -> u32 {
        self.pending.load(Ordering::Acquire).count_ones()
    }

    /// Move forward to `to`. Returns the previous state; never moves back.
    pub(crate) fn advance(&self, to: NodeState) -> NodeState {
        NodeState::from_raw(self.state.fetch_max(to as u32, Ordering::AcqRel))
    }

    /// Move to END and wake every blocked party. Returns `true` if this call
    /// performed the transition.
    pub(crate) fn end(&self) -> bool {
        if self.advance(NodeState::End) == NodeState::End {
            return false;
        }
        self.publish_seq.fetch_add(1, Ordering::Release);
        self.ack_seq.fetch_add(1, Ordering::Release);
        futex_wake_all(&self.publish_seq);
        futex_wake_all(&self.ack_seq);
        true
    }

    fn lock(&self) -> NodeLockGuard<'_> {
        // 0 = unlocked, 1 = locked, 2 = locked with waiters
        if self
            .lock
            .compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.lock.swap(2, Ordering::Acquire) != 0 {
                futex_wait(&self.lock, 2, None);
            }
        }
        NodeLockGuard { node: self }
    }

    /// Claim a free reader slot for `pid`.
    ///
    /// Returns the slot and the epoch current at registration: the reader
    /// joins at the next epoch and owes no acknowledgement before it.
    pub(crate) fn register(&self, pid: u32) -> Option<(usize, u64)> {
        let _guard = self.lock();
        let registered = self.registered.load(Ordering::Relaxed);
        let slot = registered.trailing_ones() as usize;
        if slot >= MAX_READERS {
            return None;
        }
        self.readers[slot].pid.store(pid, Ordering::Relaxed);
        self.registered.store(registered | (1 << slot), Ordering::Release);
        Some((slot, self.epoch.load(Ordering::Acquire)))
    }

    /// Release `slot`, dropping any acknowledgement it still owes.
    pub(crate) fn unregister(&self, slot: usize) {
        let bit = 1u64 << slot;
        let drained = {
            let _guard = self.lock();
            self.registered.fetch_and(!bit, Ordering::Release);
            self.readers[slot].pid.store(0, Ordering::Relaxed);
            self.clear_pending(bit)
        };
        if drained {
            futex_wake_all(&self.ack_seq);
        }
    }

    /// Acknowledge the current epoch for `slot`.
    pub(crate) fn acknowledge(&self, slot: usize) {
        let drained = {
            let _guard = self.lock();
            self.clear_pending(1u64 << slot)
        };
        if drained {
            futex_wake_all(&self.ack_seq);
        }
    }

    // Caller holds the lock. Returns true if this cleared the last pending bit.
    fn clear_pending(&self, bits: u64) -> bool {
        let before = self.pending.fetch_and(!bits, Ordering::AcqRel);
        if before & bits != 0 && before & !bits == 0 {
            self.ack_seq.fetch_add(1, Ordering::Release);
            return true;
        }
        false
    }

    /// Publish a new epoch: every registered reader now owes an
    /// acknowledgement. The payload must be fully written before this call.
    pub(crate) fn publish(&self, timestamp_ns: u64) -> u64 {
        self.timestamp_ns.store(timestamp_ns, Ordering::Relaxed);
        let epoch = {
            let _guard = self.lock();
            self.pending
                .store(self.registered.load(Ordering::Relaxed), Ordering::Relaxed);
            self.epoch.fetch_add(1, Ordering::Release) + 1
        };
        self.advance(NodeState::Running);
        self.publish_seq.fetch_add(1, Ordering::Release);
        futex_wake_all(&self.publish_seq);
        epoch
    }

    /// Sink side: block until the previous epoch is fully acknowledged.
    ///
    /// Returns `false` if the node ended. Reader slots whose process died are
    /// evicted every `poll`.
    pub(crate) fn wait_drained(&self, poll: Duration) -> bool {
        loop {
            // Sequence first: an end() after this load changes it and
            // cancels the futex wait.
            let seq = self.ack_seq.load(Ordering::Acquire);
            if self.state() == NodeState::End {
                return false;
            }
            if self.pending.load(Ordering::Acquire) == 0 {
                return true;
            }
            if futex_wait(&self.ack_seq, seq, Some(poll)) {
                self.evict_dead_readers();
            }
        }
    }

    /// Source side: block until an epoch newer than `seen` is published.
    ///
    /// Returns the new epoch, or `None` if the node ended. Moves the node to
    /// END if the owner process is found dead.
    pub(crate) fn wait_published(&self, seen: u64, poll: Duration) -> Option<u64> {
        loop {
            let seq = self.publish_seq.load(Ordering::Acquire);
            if self.state() == NodeState::End {
                return None;
            }
            let epoch = self.epoch();
            if epoch > seen {
                return Some(epoch);
            }
            if futex_wait(&self.publish_seq, seq, Some(poll)) {
                let owner = self.owner_pid();
                if !is_process_alive(owner) && self.end() {
                    warn!("Node owner (pid {}) is gone, ending node", owner);
                }
            }
        }
    }

    /// Drop reader slots whose process no longer exists. Returns how many were
    /// evicted.
    pub(crate) fn evict_dead_readers(&self) -> u32 {
        // Liveness checks run outside the lock; a slot is only cleared if it
        // still holds the PID that was found dead.
        let registered = self.registered.load(Ordering::Acquire);
        let mut dead: [Option<u32>; MAX_READERS] = [None; MAX_READERS];
        let mut any = false;
        for (slot, entry) in dead.iter_mut().enumerate() {
            if registered & (1 << slot) == 0 {
                continue;
            }
            let pid = self.readers[slot].pid.load(Ordering::Relaxed);
            if !is_process_alive(pid) {
                *entry = Some(pid);
                any = true;
            }
        }
        if !any {
            return 0;
        }

        let mut evicted = 0;
        let drained = {
            let _guard = self.lock();
            let mut bits = 0u64;
            for (slot, pid) in dead.iter().enumerate() {
                let Some(pid) = *pid else { continue };
                if self.registered.load(Ordering::Relaxed) & (1 << slot) != 0
                    && self.readers[slot].pid.load(Ordering::Relaxed) == pid
                {
                    self.readers[slot].pid.store(0, Ordering::Relaxed);
                    bits |= 1 << slot;
                    evicted += 1;
                    debug!("Evicting reader slot {} (pid {})", slot, pid);
                }
            }
            self.registered.fetch_and(!bits, Ordering::Release);
            self.clear_pending(bits)
        };
        if drained {
            futex_wake_all(&self.ack_seq);
        }
        if evicted > 0 {
            warn!("Evicted {} dead reader(s)", evicted);
        }
        evicted
    }
}

struct NodeLockGuard<'a> {
    node: &'a Node,
}

impl Drop for NodeLockGuard<'_> {
    fn drop(&mut self) {
        if self.node.lock.swap(0, Ordering::Release) == 2 {
            futex_wake_one(&self.node.lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::get_current_pid;
    use std::mem::MaybeUninit;
    use std::sync::Arc;

    // A zeroed Node is valid: every field is an atomic integer.
    fn zeroed_node() -> Box<Node> {
        // SAFETY: all-zero bytes are a valid value for every atomic field.
        unsafe { Box::new(MaybeUninit::<Node>::zeroed().assume_init()) }
    }

    fn ready_node() -> Box<Node> {
        let node = zeroed_node();
        node.init(get_current_pid(), 0xABCD, 16, 0.02);
        node.mark_ready();
        node
    }

    #[test]
    fn zeroed_node_is_not_ready() {
        let node = zeroed_node();
        assert!(!node.is_ready());
        assert_eq!(node.state(), NodeState::Init);
    }

    #[test]
    fn init_records_metadata() {
        let node = ready_node();
        assert!(node.is_ready());
        assert_eq!(node.version_hash(), 0xABCD);
        assert_eq!(node.payload_size(), 16);
        assert_eq!(node.period_sec(), 0.02);
        assert_eq!(node.sample().sample_number, 0);
    }

    #[test]
    fn state_is_monotonic() {
        let node = ready_node();
        assert_eq!(node.advance(NodeState::Running), NodeState::Init);
        assert_eq!(node.advance(NodeState::Init), NodeState::Running);
        assert_eq!(node.state(), NodeState::Running);

        assert!(node.end());
        assert!(!node.end());
        node.advance(NodeState::Running);
        assert_eq!(node.state(), NodeState::End);
    }

    #[test]
    fn publish_sets_pending_to_registered() {
        let node = ready_node();
        let (a, _) = node.register(1).unwrap();
        let (b, _) = node.register(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(node.reader_count(), 2);

        assert_eq!(node.publish(42), 1);
        assert_eq!(node.pending_acks(), 2);
        assert_eq!(node.state(), NodeState::Running);

        node.acknowledge(a);
        assert_eq!(node.pending_acks(), 1);
        // Double acknowledgement is harmless
        node.acknowledge(a);
        assert_eq!(node.pending_acks(), 1);
        node.acknowledge(b);
        assert_eq!(node.pending_acks(), 0);
    }

    #[test]
    fn late_registration_joins_next_epoch() {
        let node = ready_node();
        node.publish(1);
        node.publish(2);
        let (slot, seen) = node.register(1).unwrap();
        assert_eq!(seen, 2);
        assert_eq!(node.pending_acks(), 0);

        node.publish(3);
        assert_eq!(node.pending_acks(), 1);
        node.unregister(slot);
        assert_eq!(node.pending_acks(), 0);
        assert_eq!(node.reader_count(), 0);
    }

    #[test]
    fn reader_slots_are_limited() {
        let node = ready_node();
        for _ in 0..MAX_READERS {
            assert!(node.register(1).is_some());
        }
        assert!(node.register(1).is_none());
        node.unregister(7);
        assert_eq!(node.register(1).map(|(slot, _)| slot), Some(7));
    }

    #[test]
    fn dead_readers_are_evicted() {
        let node = ready_node();
        let (_live, _) = node.register(get_current_pid()).unwrap();
        // PID 0 never names a live process
        let (dead, _) = node.register(0).unwrap();
        node.publish(1);
        assert_eq!(node.pending_acks(), 2);

        assert_eq!(node.evict_dead_readers(), 1);
        assert_eq!(node.reader_count(), 1);
        assert_eq!(node.pending_acks(), 1);
        assert_eq!(node.registered.load(Ordering::Relaxed) & (1 << dead), 0);
    }

    #[test]
    fn wait_drained_returns_false_after_end() {
        let node = ready_node();
        node.register(get_current_pid()).unwrap();
        node.publish(1);
        node.end();
        assert!(!node.wait_drained(Duration::from_millis(10)));
    }

    #[test]
    fn wait_published_sees_new_epoch_from_other_thread() {
        let node: Arc<Node> = Arc::from(ready_node());
        let publisher = {
            let node = Arc::clone(&node);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                node.publish(7)
            })
        };
        assert_eq!(node.wait_published(0, Duration::from_millis(50)), Some(1));
        assert_eq!(publisher.join().unwrap(), 1);
    }

    #[test]
    fn end_wakes_blocked_reader_before_poll() {
        let node: Arc<Node> = Arc::from(ready_node());
        let waiter = {
            let node = Arc::clone(&node);
            std::thread::spawn(move || {
                let start = std::time::Instant::now();
                let result = node.wait_published(0, Duration::from_secs(30));
                (result, start.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        node.end();
        let (result, elapsed) = waiter.join().unwrap();
        assert_eq!(result, None);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn end_wakes_blocked_writer_before_poll() {
        let node: Arc<Node> = Arc::from(ready_node());
        node.register(get_current_pid()).unwrap();
        node.publish(1);
        let waiter = {
            let node = Arc::clone(&node);
            std::thread::spawn(move || {
                let start = std::time::Instant::now();
                let drained = node.wait_drained(Duration::from_secs(30));
                (drained, start.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        node.end();
        let (drained, elapsed) = waiter.join().unwrap();
        assert!(!drained);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn lock_is_mutually_exclusive() {
        let node: Arc<Node> = Arc::from(ready_node());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let node = Arc::clone(&node);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let _guard = node.lock();
                        // Non-atomic read-modify-write protected by the lock
                        let v = node._reserved.load(Ordering::Relaxed);
                        node._reserved.store(v + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(node._reserved.load(Ordering::Relaxed), 4000);
    }
}
