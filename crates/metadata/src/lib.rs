//! Volume group metadata for cachevol
//!
//! The volume/segment graph is an arena: volumes and segments live in one
//! [`VolumeGroup`] and refer to each other by stable [`VolumeId`] and
//! [`SegmentId`] values. Every volume keeps a `users` set of the segments that
//! map onto it, and every graph primitive in [`graph`] maintains that set
//! together with the forward references. [`VolumeGroup::validate`] checks the
//! whole graph and runs before any metadata write.
//!
//! Persistence is behind the [`MetadataStore`] trait, which exposes the
//! two-phase write (precommit) / commit protocol.

pub mod graph;
pub mod model;
pub mod segtype;
pub mod status;
pub mod store;
pub mod validate;
pub mod vg;

pub use model::{CacheMode, CacheSettings, Segment, SegmentArea, SegmentId, Volume, VolumeId};
pub use segtype::{SegmentKind, SegmentType, SegmentTypeRegistry};
pub use status::VolumeStatus;
pub use store::{FileMetadataStore, MemoryMetadataStore, MetadataStore};
pub use vg::VolumeGroup;
