//! Shared utilities for cachevol
//!
//! This crate provides the plumbing the metadata store and the command line
//! front end share: crash-safe file replacement, the volume group lock token,
//! and tracing subscriber setup.

pub mod atomic_file;
pub mod tracing;
pub mod vg_lock;

pub use atomic_file::*;
pub use vg_lock::*;
