//! Fixed-layout sample types exchanged between pipeline components.
//!
//! All types here are `#[repr(C)]` and implement
//! [`Payload`](crate::shm::payload::Payload) so they can be published through
//! a shared segment.

pub mod position;

pub use position::{Point2D, Position2D};
