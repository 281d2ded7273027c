//! Error types for shared memory dataflow operations

use thiserror::Error;

/// Errors that can occur while binding, attaching or registering on a node.
///
/// All variants are fatal to the calling component: the core never retries.
/// A supervising caller may retry `Source::connect` on [`ShmError::NotFound`].
#[derive(Error, Debug)]
pub enum ShmError {
    /// Address is empty, too long or contains characters outside `[A-Za-z0-9_.-]`
    #[error("Invalid address: '{address}'")]
    InvalidAddress {
        /// Offending address
        address: String,
    },

    /// A live owner has already bound this address
    #[error("Address already in use: {address}")]
    AddressInUse {
        /// Segment address
        address: String,
    },

    /// No sink has bound this address (yet)
    #[error("Segment not found: {address}")]
    NotFound {
        /// Segment address
        address: String,
    },

    /// The OS refused to back the segment
    #[error("Failed to allocate segment {address}: {source}")]
    AllocationFailed {
        /// Segment address
        address: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The owner published a different payload type at this address
    #[error(
        "Payload type mismatch on {address}: expected {expected_size} bytes (hash {expected_hash:#010x}), \
         found {actual_size} bytes (hash {actual_hash:#010x})"
    )]
    TypeMismatch {
        /// Segment address
        address: String,
        /// Size of the payload this process expects
        expected_size: usize,
        /// Size recorded by the owner
        actual_size: usize,
        /// Layout hash this process expects
        expected_hash: u32,
        /// Layout hash recorded by the owner
        actual_hash: u32,
    },

    /// Every reader slot of the node is taken
    #[error("No free reader slot on {address} (max {max})")]
    ReaderLimit {
        /// Segment address
        address: String,
        /// Number of slots
        max: usize,
    },

    /// Sample period is not a finite positive number of seconds
    #[error("Invalid sample period: {period_sec} s")]
    InvalidPeriod {
        /// Offending period
        period_sec: f64,
    },

    /// `connect()` was called before `touch()`
    #[error("Source has no address: touch() must precede connect()")]
    NotTouched,

    /// The sink is already bound to an address
    #[error("Sink already bound to {address}")]
    AlreadyBound {
        /// Address of the existing binding
        address: String,
    },

    /// Fan-in inputs rejected by the rate check
    #[error("Rate check failed: {source}")]
    Rate {
        /// Source rate error
        #[from]
        source: crate::rate::RateError,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for shared memory operations
pub type ShmResult<T> = Result<T, ShmError>;
