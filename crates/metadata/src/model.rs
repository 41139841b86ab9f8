//! Volumes, segments and the identifiers that link them

use crate::segtype::SegmentType;
use crate::status::VolumeStatus;
use cachevol_core::{DEFAULT_CACHE_CHUNK_SIZE, DEFAULT_CACHE_POLICY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable arena index of a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub(crate) u32);

/// Stable arena index of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub(crate) u32);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lv#{}", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg#{}", self.0)
    }
}

/// What a segment area maps onto
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentArea {
    /// Extents on a physical volume
    Physical { pv: String, start: u64 },
    /// Extents of another volume in the same group
    Volume { volume: VolumeId, start: u64 },
}

impl SegmentArea {
    pub fn volume(&self) -> Option<VolumeId> {
        match self {
            SegmentArea::Volume { volume, .. } => Some(*volume),
            SegmentArea::Physical { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Writethrough,
    Writeback,
}

/// Parameters of `cache` and `cache-pool` segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub mode: CacheMode,
    /// Cache block size in sectors
    pub chunk_size: u64,
    pub policy: String,
    pub policy_args: Vec<(String, String)>,
}

impl CacheSettings {
    /// Switch policy; arguments of the previous policy never carry over
    pub fn set_policy(&mut self, policy: impl Into<String>) {
        self.policy = policy.into();
        self.policy_args.clear();
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            mode: CacheMode::Writethrough,
            chunk_size: DEFAULT_CACHE_CHUNK_SIZE,
            policy: DEFAULT_CACHE_POLICY.to_string(),
            policy_args: Vec::new(),
        }
    }
}

/// Contiguous run of logical extents within a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub(crate) id: SegmentId,
    pub(crate) volume: VolumeId,
    pub(crate) start_extent: u64,
    pub(crate) extent_count: u64,
    pub(crate) segtype: SegmentType,
    pub(crate) areas: Vec<SegmentArea>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) pool: Option<VolumeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) cache: Option<CacheSettings>,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Owning volume
    pub fn volume(&self) -> VolumeId {
        self.volume
    }

    pub fn start_extent(&self) -> u64 {
        self.start_extent
    }

    pub fn extent_count(&self) -> u64 {
        self.extent_count
    }

    pub fn segtype(&self) -> SegmentType {
        self.segtype
    }

    pub fn areas(&self) -> &[SegmentArea] {
        &self.areas
    }

    /// Volume mapped by area `index`, if that area is a sub-volume
    pub fn sub_volume(&self, index: usize) -> Option<VolumeId> {
        self.areas.get(index).and_then(SegmentArea::volume)
    }

    pub fn pool(&self) -> Option<VolumeId> {
        self.pool
    }

    pub fn cache_settings(&self) -> Option<&CacheSettings> {
        self.cache.as_ref()
    }
}

/// Named storage object of a volume group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub(crate) id: VolumeId,
    pub(crate) name: String,
    pub(crate) status: VolumeStatus,
    pub(crate) segments: Vec<SegmentId>,
    /// Segments elsewhere in the group that map onto this volume
    pub(crate) users: BTreeSet<SegmentId>,
    pub(crate) created: DateTime<Utc>,
}

impl Volume {
    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> VolumeStatus {
        self.status
    }

    pub fn is_visible(&self) -> bool {
        self.status.contains(VolumeStatus::VISIBLE)
    }

    pub fn is_cache(&self) -> bool {
        self.status.contains(VolumeStatus::CACHE)
    }

    pub fn is_cache_pool(&self) -> bool {
        self.status.contains(VolumeStatus::CACHE_POOL)
    }

    pub fn is_cache_type(&self) -> bool {
        self.status.is_cache_type()
    }

    pub fn segment_ids(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn users(&self) -> &BTreeSet<SegmentId> {
        &self.users
    }

    pub fn is_in_use(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}
