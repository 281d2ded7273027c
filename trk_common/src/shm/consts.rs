//! SHM (Shared Memory) constants.
//!
//! These constants define the fundamental parameters of the trk shared memory
//! dataflow layer. They are the single source of truth - all other crates
//! should import from here.

use std::time::Duration;

/// Magic bytes identifying an initialized trk node header: `"TRK_NODE"`.
pub const TRK_NODE_MAGIC: u64 = u64::from_le_bytes(*b"TRK_NODE");

/// Directory holding the shared memory backing files (tmpfs on Linux).
pub const SHM_DIR: &str = "/dev/shm";

/// Prefix of every backing file name: `/dev/shm/trk_<address>`.
pub const SHM_PREFIX: &str = "trk_";

/// Maximum address length in bytes.
pub const MAX_ADDRESS_LEN: usize = 200;

/// Maximum number of readers registered on one node.
///
/// Reader membership is tracked as a `u64` bitmask.
pub const MAX_READERS: usize = 64;

/// CPU cache line size in bytes.
///
/// Node header and payload slot are aligned to this boundary to avoid
/// false sharing between the header atomics and payload writes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Interval at which blocked waits re-check peer liveness.
///
/// A blocked `Source` checks whether the owning process is still alive; a
/// blocked `Sink` evicts reader slots whose process has died.
pub const LIVENESS_POLL: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_trk_node() {
        assert_eq!(&TRK_NODE_MAGIC.to_le_bytes(), b"TRK_NODE");
    }

    #[test]
    fn reader_mask_width() {
        assert!(MAX_READERS <= u64::BITS as usize);
    }

    #[test]
    fn test_cache_line_size() {
        assert_eq!(CACHE_LINE_SIZE, 64);
    }

    #[test]
    fn liveness_poll_is_bounded() {
        assert!(LIVENESS_POLL > Duration::ZERO);
        assert!(LIVENESS_POLL <= Duration::from_secs(1));
    }
}
