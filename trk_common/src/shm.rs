//! Shared memory subsystem definitions.
//!
//! This module contains:
//! - `consts`: Segment naming, reader slot limits and liveness timing.
//! - `payload`: The `Payload` marker trait and compile-time layout hashing.

pub mod consts;
pub mod payload;
