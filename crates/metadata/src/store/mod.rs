//! Persisted metadata: the two-phase write/commit transaction
//!
//! `write` stages a precommitted copy of the group; it does not change what
//! `load` returns. `commit` makes the staged copy authoritative. Between the
//! two, the committed metadata still describes the old graph, which is what
//! lets the commit protocol keep disk and live mapping in agreement.

mod file;
mod memory;

pub use file::FileMetadataStore;
pub use memory::MemoryMetadataStore;

use crate::vg::VolumeGroup;
use cachevol_core::Result;

pub trait MetadataStore {
    /// Stage `vg` as precommitted metadata; validates the graph first
    fn write(&self, vg: &VolumeGroup) -> Result<()>;

    /// Make the precommitted copy with `vg`'s sequence number authoritative
    fn commit(&self, vg: &VolumeGroup) -> Result<()>;

    /// Read the committed metadata of a group
    fn load(&self, vg_name: &str) -> Result<VolumeGroup>;

    /// Whether committed metadata exists for a group
    fn exists(&self, vg_name: &str) -> bool;

    /// Persist a brand-new group in one step
    fn create(&self, vg: &mut VolumeGroup) -> Result<()> {
        vg.increment_seqno();
        self.write(vg)?;
        self.commit(vg)
    }
}
