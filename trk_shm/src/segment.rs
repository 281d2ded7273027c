//! Shared memory segment structures and operations
//!
//! A segment is one tmpfs file `/dev/shm/trk_<address>` laid out as
//! `[Node | padding | T]`. [`OwnedSegment`] creates and destroys it;
//! [`AttachedSegment`] can only map an existing one.

use crate::error::{ShmError, ShmResult};
use crate::node::Node;
use crate::platform::{
    create_segment_file, get_current_pid, is_process_alive, map_segment, open_segment_file,
};
use memmap2::MmapMut;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trk::shm::consts::{CACHE_LINE_SIZE, MAX_ADDRESS_LEN, SHM_DIR, SHM_PREFIX};
use trk::shm::payload::{Payload, layout_hash};

/// Byte offset of the payload slot for `T`.
pub const fn payload_offset<T>() -> usize {
    let align = if std::mem::align_of::<T>() > CACHE_LINE_SIZE {
        std::mem::align_of::<T>()
    } else {
        CACHE_LINE_SIZE
    };
    std::mem::size_of::<Node>().div_ceil(align) * align
}

/// Total mapped length of a segment carrying `T`.
pub const fn segment_len<T>() -> usize {
    payload_offset::<T>() + std::mem::size_of::<T>()
}

/// Validate an address: non-empty, at most [`MAX_ADDRESS_LEN`] bytes of
/// `[A-Za-z0-9_.-]`.
pub fn validate_address(address: &str) -> ShmResult<()> {
    let valid = !address.is_empty()
        && address.len() <= MAX_ADDRESS_LEN
        && address
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        && address != "."
        && address != "..";
    if valid {
        Ok(())
    } else {
        Err(ShmError::InvalidAddress {
            address: address.to_string(),
        })
    }
}

/// Backing file path for an address.
pub fn segment_path(address: &str) -> PathBuf {
    Path::new(SHM_DIR).join(format!("{SHM_PREFIX}{address}"))
}

/// A live shared mapping. Shared between a segment handle and any
/// [`crate::ShutdownHandle`] derived from it.
pub(crate) struct Mapping {
    base: NonNull<u8>,
    len: usize,
    _mmap: MmapMut,
}

// SAFETY: the mapping is process-shared memory; every cross-thread access goes
// through the Node's atomics or the handshake that serializes payload access.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn new(mut mmap: MmapMut) -> Self {
        let len = mmap.len();
        // A successful mmap never returns null.
        let base = NonNull::new(mmap.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            base,
            len,
            _mmap: mmap,
        }
    }

    pub(crate) fn node(&self) -> &Node {
        // SAFETY: every mapping is at least size_of::<Node>() long and page
        // aligned; all Node fields are atomics valid for any bit pattern.
        unsafe { &*(self.base.as_ptr() as *const Node) }
    }

    /// Raw pointer to the payload slot. Callers must hold the handshake
    /// window that grants them access.
    pub(crate) fn payload<T: Payload>(&self) -> *mut T {
        debug_assert!(self.len >= segment_len::<T>());
        // SAFETY: offset is in bounds and aligned for T (checked at map time).
        unsafe { self.base.as_ptr().add(payload_offset::<T>()) as *mut T }
    }
}

/// Owner-side segment: creates the backing file and destroys it.
pub struct OwnedSegment<T: Payload> {
    address: String,
    path: PathBuf,
    map: Arc<Mapping>,
    destroyed: bool,
    _marker: PhantomData<T>,
}

impl<T: Payload> OwnedSegment<T> {
    /// Create the segment for `address`, initialize its node to INIT with the
    /// given sample period and its payload slot to `T::default()`.
    ///
    /// A leftover file whose owner process is dead is reclaimed. A live owner
    /// yields [`ShmError::AddressInUse`].
    pub fn create(address: &str, period_sec: f64) -> ShmResult<Self> {
        validate_address(address)?;
        let path = segment_path(address);
        let len = segment_len::<T>();

        let file = match create_segment_file(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                reclaim_orphan(address, &path)?;
                create_segment_file(&path).map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => ShmError::AddressInUse {
                        address: address.to_string(),
                    },
                    _ => ShmError::AllocationFailed {
                        address: address.to_string(),
                        source: e,
                    },
                })?
            }
            Err(e) => {
                return Err(ShmError::AllocationFailed {
                    address: address.to_string(),
                    source: e,
                });
            }
        };

        let mmap = file
            .set_len(len as u64)
            .and_then(|_| map_segment(&file, len, true))
            .map_err(|e| {
                let _ = std::fs::remove_file(&path);
                ShmError::AllocationFailed {
                    address: address.to_string(),
                    source: e,
                }
            })?;
        let map = Arc::new(Mapping::new(mmap));

        // SAFETY: the file was just created by us; nobody else can map the
        // payload before the node is marked ready.
        unsafe { map.payload::<T>().write(T::default()) };
        map.node().init(
            get_current_pid(),
            layout_hash::<T>(),
            std::mem::size_of::<T>() as u64,
            period_sec,
        );
        map.node().mark_ready();

        info!(
            "Created segment '{}' ({} bytes, period {} s)",
            address, len, period_sec
        );

        Ok(Self {
            address: address.to_string(),
            path,
            map,
            destroyed: false,
            _marker: PhantomData,
        })
    }

    /// Segment address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Node header.
    pub fn node(&self) -> &Node {
        self.map.node()
    }

    pub(crate) fn mapping(&self) -> &Arc<Mapping> {
        &self.map
    }

    /// End the node and unlink the backing file. Idempotent.
    ///
    /// Attached processes keep their mapping and observe END.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.node().end();
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Destroyed segment '{}'", self.address),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to unlink segment '{}': {}", self.address, e),
        }
    }
}

impl<T: Payload> Drop for OwnedSegment<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Reader-side segment: maps an existing segment, never removes it.
pub struct AttachedSegment<T: Payload> {
    address: String,
    map: Arc<Mapping>,
    _marker: PhantomData<T>,
}

impl<T: Payload> AttachedSegment<T> {
    /// Map the segment bound at `address` and verify it carries `T`.
    pub fn attach(address: &str) -> ShmResult<Self> {
        validate_address(address)?;
        let not_found = || ShmError::NotFound {
            address: address.to_string(),
        };

        let file = open_segment_file(&segment_path(address)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => not_found(),
            _ => ShmError::Io { source: e },
        })?;
        let file_len = file.metadata()?.len() as usize;
        // Creator has not sized the file yet
        if file_len < std::mem::size_of::<Node>() {
            return Err(not_found());
        }

        let map = Arc::new(Mapping::new(map_segment(&file, file_len, false)?));
        let node = map.node();
        if !node.is_ready() {
            return Err(not_found());
        }

        let expected_hash = layout_hash::<T>();
        let expected_size = std::mem::size_of::<T>();
        if node.version_hash() != expected_hash
            || node.payload_size() != expected_size as u64
            || file_len < segment_len::<T>()
        {
            return Err(ShmError::TypeMismatch {
                address: address.to_string(),
                expected_size,
                actual_size: node.payload_size() as usize,
                expected_hash,
                actual_hash: node.version_hash(),
            });
        }

        debug!("Attached segment '{}' (owner pid {})", address, node.owner_pid());
        Ok(Self {
            address: address.to_string(),
            map,
            _marker: PhantomData,
        })
    }

    /// Segment address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Node header.
    pub fn node(&self) -> &Node {
        self.map.node()
    }

    pub(crate) fn mapping(&self) -> &Mapping {
        &self.map
    }
}

// Remove the file at `path` if its owner is gone, else report AddressInUse.
fn reclaim_orphan(address: &str, path: &Path) -> ShmResult<()> {
    let in_use = || ShmError::AddressInUse {
        address: address.to_string(),
    };

    let file = match open_segment_file(path) {
        Ok(file) => file,
        // Vanished in between: free to create
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(_) => return Err(in_use()),
    };
    let file_len = file.metadata()?.len() as usize;
    // A creator that has not finished initializing is treated as live.
    if file_len < std::mem::size_of::<Node>() {
        return Err(in_use());
    }
    let map = Mapping::new(map_segment(&file, file_len, false)?);
    let node = map.node();
    if !node.is_ready() {
        return Err(in_use());
    }

    let owner = node.owner_pid();
    if is_process_alive(owner) {
        return Err(in_use());
    }

    warn!(
        "Reclaiming orphaned segment '{}' (owner pid {} is gone)",
        address, owner
    );
    node.end();
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShmError::AllocationFailed {
            address: address.to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeState;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_address(tag: &str) -> String {
        format!(
            "seg_{}_{}_{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_address_validation() {
        assert!(validate_address("camera.left_0-raw").is_ok());
        assert!(validate_address(&"a".repeat(MAX_ADDRESS_LEN)).is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("..").is_err());
        assert!(validate_address("a/b").is_err());
        assert!(validate_address("has space").is_err());
        assert!(validate_address(&"a".repeat(MAX_ADDRESS_LEN + 1)).is_err());
    }

    #[test]
    fn test_layout() {
        assert_eq!(payload_offset::<u8>() % CACHE_LINE_SIZE, 0);
        assert!(payload_offset::<u64>() >= std::mem::size_of::<Node>());
        assert_eq!(
            segment_len::<[u8; 100]>(),
            payload_offset::<[u8; 100]>() + 100
        );
    }

    #[test]
    fn test_segment_path() {
        assert_eq!(
            segment_path("cam0"),
            PathBuf::from(format!("{SHM_DIR}/{SHM_PREFIX}cam0"))
        );
    }

    #[test]
    fn test_create_and_attach() {
        let address = unique_address("create");
        let owned = OwnedSegment::<u64>::create(&address, 0.5).unwrap();
        assert_eq!(owned.node().state(), NodeState::Init);
        assert_eq!(owned.node().period_sec(), 0.5);
        assert_eq!(owned.node().owner_pid(), get_current_pid());

        let attached = AttachedSegment::<u64>::attach(&address).unwrap();
        assert_eq!(attached.address(), address);
        // SAFETY: nothing writes the slot in this test
        let value = unsafe { attached.mapping().payload::<u64>().read() };
        assert_eq!(value, 0);
    }

    #[test]
    fn test_create_twice_is_address_in_use() {
        let address = unique_address("twice");
        let _owned = OwnedSegment::<u32>::create(&address, 0.1).unwrap();
        let err = OwnedSegment::<u32>::create(&address, 0.1).err().unwrap();
        assert!(matches!(err, ShmError::AddressInUse { .. }));
    }

    #[test]
    fn test_attach_missing_is_not_found() {
        let err = AttachedSegment::<u32>::attach(&unique_address("missing"))
            .err()
            .unwrap();
        assert!(matches!(err, ShmError::NotFound { .. }));
    }

    #[test]
    fn test_attach_wrong_type() {
        let address = unique_address("mismatch");
        let _owned = OwnedSegment::<[u8; 32]>::create(&address, 0.1).unwrap();
        let err = AttachedSegment::<u64>::attach(&address).err().unwrap();
        match err {
            ShmError::TypeMismatch {
                expected_size,
                actual_size,
                ..
            } => {
                assert_eq!(expected_size, 8);
                assert_eq!(actual_size, 32);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_destroy_is_idempotent_and_ends_node() {
        let address = unique_address("destroy");
        let mut owned = OwnedSegment::<u16>::create(&address, 0.1).unwrap();
        let attached = AttachedSegment::<u16>::attach(&address).unwrap();

        owned.destroy();
        owned.destroy();
        assert!(!segment_path(&address).exists());
        assert_eq!(attached.node().state(), NodeState::End);
    }

    #[test]
    fn test_orphan_is_reclaimed() {
        let address = unique_address("orphan");
        let mut stale = OwnedSegment::<u32>::create(&address, 0.1).unwrap();
        // Pretend the owner died without cleaning up: PID 0 is never alive.
        stale.node().init(0, layout_hash::<u32>(), 4, 0.1);
        // Keep the stale file on disk when the handle goes away
        stale.destroyed = true;
        drop(stale);
        assert!(segment_path(&address).exists());

        let fresh = OwnedSegment::<u32>::create(&address, 0.2).unwrap();
        assert_eq!(fresh.node().owner_pid(), get_current_pid());
        assert_eq!(fresh.node().period_sec(), 0.2);
    }
}
