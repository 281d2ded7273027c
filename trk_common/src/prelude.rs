//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use trk_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use trk_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig, load_shared, load_table};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_SAMPLE_PERIOD_SEC, MAX_FAN_IN, MAX_SAMPLE_PERIOD_SEC};

// ─── Payloads ───────────────────────────────────────────────────────
pub use crate::datatypes::{Point2D, Position2D};
pub use crate::shm::payload::{Payload, layout_hash};
