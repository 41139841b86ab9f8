//! Cache attach and detach for cachevol
//!
//! [`CacheController`] inserts a hidden `_corig` layer beneath an origin
//! volume and links a cache pool to it, and reverses that after the cache has
//! been flushed. Structural changes reach disk and the live mapping only
//! through [`CommitProtocol`], which always runs write, suspend, commit and
//! resume in that order.
//!
//! Detaching is gated on a [`Flushed`] token. The only way to obtain one is a
//! zero dirty-block reading from [`FlushController::poll_once`], and a token
//! is only accepted by the group and metadata sequence number it was read
//! against, so the pool can never be unlinked while it still holds data the
//! origin lacks.

pub mod attach;
pub mod commit;
pub mod context;
pub mod controller;
pub mod detach;
pub mod flush;

pub use commit::CommitProtocol;
pub use context::CacheContext;
pub use controller::CacheController;
pub use detach::DetachReport;
pub use flush::{FlushController, FlushState, FlushWaitPolicy, Flushed};

#[cfg(test)]
mod testing;
