//! Configuration for cachevol
//!
//! Settings come from, in increasing precedence: built-in defaults, a JSON
//! config file, `CACHEVOL_*` environment variables, and finally whatever the
//! caller applies through [`CacheVolConfigBuilder`] (the CLI flags).

pub mod config;
pub mod loader;

pub use config::*;
pub use loader::*;
