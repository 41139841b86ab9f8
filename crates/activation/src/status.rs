use cachevol_core::Result;
use cachevol_metadata::{VolumeGroup, VolumeId};

/// Policy currently loaded in a live cache target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInfo {
    pub name: String,
    pub args: Vec<(String, String)>,
}

/// Block counters of a live cache target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Cache block size in sectors
    pub block_size: u64,
    pub total_blocks: u64,
    pub used_blocks: u64,
    pub dirty_blocks: u64,
}

/// Read-only status queries against a live cache target
pub trait CacheStatusSource {
    fn policy_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<PolicyInfo>;

    fn block_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<BlockInfo>;
}
