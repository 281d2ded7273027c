//! trk Common Library
//!
//! This crate provides shared constants, payload types and configuration
//! loading utilities for all trk workspace crates.
//!
//! # Module Structure
//!
//! - [`shm`] - Shared memory constants, payload marker and layout hashing
//! - [`datatypes`] - Fixed-layout sample types exchanged between components
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! trk = { package = "trk_common", path = "../trk_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use trk_common::datatypes::Position2D;
//! use trk_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod datatypes;
pub mod prelude;
pub mod shm;
