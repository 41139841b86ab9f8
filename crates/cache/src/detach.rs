//! Detaching a cache pool and removing the vacated layer

use crate::controller::CacheController;
use crate::flush::{FlushController, Flushed};
use cachevol_core::{Error, Result, TeardownStep, ERROR_SEGTYPE};
use cachevol_metadata::{SegmentKind, SegmentTypeRegistry, VolumeGroup, VolumeId, VolumeStatus};
use cachevol_utils::tracing::operation_span;
use cachevol_utils::VgLockGuard;
use tracing::Instrument;

/// What a completed detach did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachReport {
    /// The formerly cached volume, now a plain volume again
    pub volume: String,
    pub pool: VolumeId,
    pub pool_name: String,
    /// Name of the hidden layer that was removed
    pub removed_layer: String,
    pub flush_polls: u64,
    /// Whether the cleaner policy had to be committed before flushing
    pub cleaner_swapped: bool,
}

/// Volumes touched by [`promote_origin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    pub cached: VolumeId,
    pub pool: VolumeId,
    /// The emptied layer, now holding a single `error` segment
    pub layer: VolumeId,
}

/// Undo the layering of a flushed cached volume, in memory.
///
/// The pool link is dropped, the hidden layer's segments move back onto the
/// cached volume (replacing the cache segment) and the layer is left visible
/// with an `error` segment of the same length so it can be activated and
/// removed afterwards. The token must come from a clean reading of this
/// group at its current sequence number. On failure `vg` may be partially
/// modified; callers restore their own snapshot.
pub fn promote_origin(
    registry: &SegmentTypeRegistry,
    vg: &mut VolumeGroup,
    flushed: Flushed,
) -> Result<Promotion> {
    flushed.check(vg)?;
    let cached = flushed.volume();
    let error_type = registry.resolve(ERROR_SEGTYPE)?;

    let seg = vg.first_segment(cached)?;
    if seg.segtype().kind() != SegmentKind::Cache {
        return Err(Error::PoolDetach {
            volume: vg.volume_name(cached),
            message: format!("first segment is '{}', not a cache segment", seg.segtype()),
        });
    }
    let seg_id = seg.id();
    let layer = seg.sub_volume(0).ok_or_else(|| Error::PoolDetach {
        volume: vg.volume_name(cached),
        message: "cache segment has no origin area".to_string(),
    })?;

    let pool = vg.detach_pool(seg_id)?;
    vg.set_visible(layer, true)?;
    vg.remove_segment_user(layer, seg_id)?;

    let extents = vg.extent_count(layer);
    vg.move_segments(cached, layer)?;
    vg.clear_status(cached, VolumeStatus::CACHE)?;
    vg.add_virtual_segment(layer, extents, error_type)?;

    Ok(Promotion {
        cached,
        pool,
        layer,
    })
}

impl CacheController<'_> {
    /// Flush `cached`, unlink its pool and remove the vacated layer.
    ///
    /// Blocks in [`FlushController::wait_until_clean`] with this controller's
    /// flush policy. The pool is left in the group, resumed and unused.
    pub fn detach(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        cached: VolumeId,
    ) -> Result<DetachReport> {
        let span = operation_span("detach", vg.name(), &vg.volume_name(cached));
        let _enter = span.enter();

        let mut flush = FlushController::begin(self.ctx, lock, vg, cached)?;
        let flushed = flush.wait_until_clean(vg, &self.flush)?;
        self.finish_detach(lock, vg, flushed, &flush)
    }

    /// [`detach`](Self::detach) with the flush wait on the tokio timer
    pub async fn detach_async(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        cached: VolumeId,
    ) -> Result<DetachReport> {
        let span = operation_span("detach", vg.name(), &vg.volume_name(cached));
        async move {
            let mut flush = FlushController::begin(self.ctx, lock, vg, cached)?;
            let flushed = flush.wait_until_clean_async(vg, &self.flush).await?;
            self.finish_detach(lock, vg, flushed, &flush)
        }
        .instrument(span)
        .await
    }

    fn finish_detach(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        flushed: Flushed,
        flush: &FlushController<'_>,
    ) -> Result<DetachReport> {
        lock.check(vg.name())?;
        let snapshot = vg.clone();
        let promotion = match promote_origin(self.ctx.registry, vg, flushed) {
            Ok(promotion) => promotion,
            Err(e) => {
                *vg = snapshot;
                return Err(e);
            }
        };

        if let Err(e) = self.commit_and_apply(lock, vg, promotion.cached, &[promotion.pool]) {
            if e.precedes_metadata_write() {
                *vg = snapshot;
            }
            return Err(e);
        }

        let report = DetachReport {
            volume: vg.volume_name(promotion.cached),
            pool: promotion.pool,
            pool_name: vg.volume_name(promotion.pool),
            removed_layer: vg.volume_name(promotion.layer),
            flush_polls: flush.polls(),
            cleaner_swapped: flush.cleaner_swapped(),
        };
        self.remove_layer(vg, promotion.layer)?;

        tracing::info!(
            lv = %report.volume,
            pool = %report.pool_name,
            polls = report.flush_polls,
            "detached cache pool"
        );
        Ok(report)
    }

    /// Activate and deactivate the emptied layer, then delete it for good.
    ///
    /// The layer is unreferenced and inactive once this starts, so the
    /// removal is persisted without suspending anything. `vg` only changes
    /// if every step succeeds.
    fn remove_layer(&self, vg: &mut VolumeGroup, layer: VolumeId) -> Result<()> {
        let name = vg.volume_name(layer);
        let fail = |step, source| Error::teardown(step, &name, source);
        let devices = self.ctx.devices;

        devices
            .activate(vg, layer)
            .map_err(|e| fail(TeardownStep::Activate, e))?;
        devices
            .deactivate(vg, layer)
            .map_err(|e| fail(TeardownStep::Deactivate, e))?;

        let mut staged = vg.clone();
        staged
            .remove_volume(layer)
            .map_err(|e| fail(TeardownStep::Remove, e))?;
        staged.increment_seqno();
        self.ctx
            .store
            .write(&staged)
            .and_then(|()| self.ctx.store.commit(&staged))
            .map_err(|e| fail(TeardownStep::Persist, e))?;
        *vg = staged;

        tracing::debug!(lv = %name, "removed vacated layer");
        Ok(())
    }
}
