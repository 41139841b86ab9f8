//! Core domain types, errors, and constants for `cachevol`.
//!
//! Everything above this crate (the metadata arena, the live-mapping layer and
//! the cache attach/detach orchestration) reports failures through the single
//! [`Error`] enum defined here, so callers can classify a failure and read a
//! [`RecoveryHint`] without knowing which layer raised it.
//!
//! ## Key Components
//!
//! - **`errors`**: The `Error` enum, `Result` alias, error classes and recovery
//!   hints.
//! - **`types`**: Validated name newtypes for volumes and volume groups.
//! - **`constants`**: Segment type names, reserved suffixes, policy names and
//!   environment variable names shared by all crates.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, ErrorClass, RecoveryHint, Result, TeardownStep, TransactionStep},
    types::*,
};
