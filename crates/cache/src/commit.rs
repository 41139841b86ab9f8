//! The write, suspend, commit, resume protocol
//!
//! Metadata is precommitted first so the new tables can be loaded, the
//! primary volume is suspended (freezing its whole live stack), the metadata
//! is made authoritative, and only then does resume load the new tables.
//! A failing step is reported with the step that failed; nothing is retried
//! and nothing is rolled back, since after a commit the new metadata is
//! already the truth.

use cachevol_activation::DeviceMapper;
use cachevol_core::{Error, Result, TransactionStep};
use cachevol_metadata::{MetadataStore, VolumeGroup, VolumeId};
use cachevol_utils::VgLockGuard;

#[derive(Clone, Copy)]
pub struct CommitProtocol<'a> {
    store: &'a dyn MetadataStore,
    devices: &'a dyn DeviceMapper,
}

impl<'a> CommitProtocol<'a> {
    pub fn new(store: &'a dyn MetadataStore, devices: &'a dyn DeviceMapper) -> Self {
        Self { store, devices }
    }

    /// Persist `vg` and apply it to the live mapping of `primary`.
    ///
    /// The sequence number is advanced as part of the write; a failed write
    /// leaves `vg` exactly as it was. Volumes in `extra_resume` are resumed
    /// after the primary, for devices the new metadata no longer links to it.
    pub fn commit_and_apply(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        primary: VolumeId,
        extra_resume: &[VolumeId],
    ) -> Result<()> {
        lock.check(vg.name())?;
        let name = vg.volume_name(primary);
        let fail = |step, source| Error::transaction(step, &name, source);

        let mut staged = vg.clone();
        staged.increment_seqno();
        self.store
            .write(&staged)
            .map_err(|e| fail(TransactionStep::Write, e))?;
        *vg = staged;

        self.devices
            .suspend(vg, primary)
            .map_err(|e| fail(TransactionStep::Suspend, e))?;

        self.store
            .commit(vg)
            .map_err(|e| fail(TransactionStep::Commit, e))?;

        self.devices
            .resume(vg, primary)
            .map_err(|e| fail(TransactionStep::Resume, e))?;

        for extra in extra_resume {
            self.devices
                .resume(vg, *extra)
                .map_err(|e| Error::transaction(TransactionStep::Resume, vg.volume_name(*extra), e))?;
        }

        tracing::debug!(vg = %vg.name(), lv = %name, seqno = vg.seqno(), "committed and applied");
        Ok(())
    }
}
