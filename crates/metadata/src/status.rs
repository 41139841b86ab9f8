//! Volume status flags

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Status bits carried by every volume
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct VolumeStatus: u32 {
        /// Exposed to users; cleared on internal layer volumes
        const VISIBLE = 1 << 0;
        /// Top-level volume of a cache stack
        const CACHE = 1 << 1;
        /// Cache pool volume
        const CACHE_POOL = 1 << 2;
        /// Hidden data sub-volume of a cache pool
        const CACHE_POOL_DATA = 1 << 3;
        /// Hidden metadata sub-volume of a cache pool
        const CACHE_POOL_METADATA = 1 << 4;
    }
}

impl VolumeStatus {
    /// Any bit that makes a volume part of a cache stack
    pub const CACHE_TYPES: Self = Self::CACHE
        .union(Self::CACHE_POOL)
        .union(Self::CACHE_POOL_DATA)
        .union(Self::CACHE_POOL_METADATA);

    pub fn is_cache_type(self) -> bool {
        self.intersects(Self::CACHE_TYPES)
    }
}
