use super::MetadataStore;
use crate::vg::VolumeGroup;
use cachevol_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Slot {
    committed: Option<VolumeGroup>,
    precommitted: Option<VolumeGroup>,
}

/// Metadata store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Staged copy awaiting commit, if any
    pub fn precommitted(&self, vg_name: &str) -> Option<VolumeGroup> {
        self.slots
            .lock()
            .get(vg_name)
            .and_then(|s| s.precommitted.clone())
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn write(&self, vg: &VolumeGroup) -> Result<()> {
        vg.validate()?;
        let mut slots = self.slots.lock();
        let slot = slots.entry(vg.name().to_string()).or_default();
        if let Some(committed) = &slot.committed {
            if vg.seqno() <= committed.seqno() {
                return Err(Error::metadata(
                    vg.name(),
                    "write",
                    format!(
                        "sequence number {} does not advance committed {}",
                        vg.seqno(),
                        committed.seqno()
                    ),
                ));
            }
        }
        slot.precommitted = Some(vg.clone());
        tracing::trace!(vg = %vg.name(), seqno = vg.seqno(), "precommitted metadata");
        Ok(())
    }

    fn commit(&self, vg: &VolumeGroup) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(vg.name())
            .ok_or_else(|| Error::metadata(vg.name(), "commit", "no precommitted metadata"))?;
        match slot.precommitted.take() {
            Some(staged) if staged.seqno() == vg.seqno() => {
                slot.committed = Some(staged);
                tracing::trace!(vg = %vg.name(), seqno = vg.seqno(), "committed metadata");
                Ok(())
            }
            Some(staged) => {
                let seqno = staged.seqno();
                slot.precommitted = Some(staged);
                Err(Error::metadata(
                    vg.name(),
                    "commit",
                    format!("precommitted seqno {seqno} differs from {}", vg.seqno()),
                ))
            }
            None => Err(Error::metadata(vg.name(), "commit", "no precommitted metadata")),
        }
    }

    fn load(&self, vg_name: &str) -> Result<VolumeGroup> {
        self.slots
            .lock()
            .get(vg_name)
            .and_then(|s| s.committed.clone())
            .ok_or_else(|| Error::metadata(vg_name, "load", "volume group not found"))
    }

    fn exists(&self, vg_name: &str) -> bool {
        self.slots
            .lock()
            .get(vg_name)
            .is_some_and(|s| s.committed.is_some())
    }
}
