//! Attaching a cache pool in front of an origin volume

use crate::controller::CacheController;
use cachevol_core::{Error, Result, CACHE_SEGTYPE, CORIG_SUFFIX};
use cachevol_metadata::{VolumeGroup, VolumeId, VolumeStatus};
use cachevol_utils::tracing::operation_span;
use cachevol_utils::VgLockGuard;

impl CacheController<'_> {
    /// Put `pool` in front of `origin`, in memory only.
    ///
    /// `origin` keeps its id and name and becomes the cached volume. Its
    /// segments move to a hidden `<origin>_corig` layer, and its single new
    /// segment is a `cache` segment over that layer, linked to `pool` and
    /// carrying the pool's cache settings. On error `vg` is left untouched.
    pub fn attach(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        pool: VolumeId,
        origin: VolumeId,
    ) -> Result<VolumeId> {
        lock.check(vg.name())?;

        let pool_volume = vg.volume(pool)?;
        if !pool_volume.is_cache_pool() {
            return Err(Error::not_a_cache_pool(pool_volume.name()));
        }
        let origin_volume = vg.volume(origin)?;
        if origin_volume.is_cache_type() {
            return Err(Error::origin_already_cached(origin_volume.name()));
        }
        let origin_name = origin_volume.name().to_string();

        let cache_type = self.ctx.registry.resolve(CACHE_SEGTYPE)?;
        let settings = vg
            .first_segment(pool)?
            .cache_settings()
            .cloned()
            .unwrap_or_default();

        let span = operation_span("attach", vg.name(), &origin_name);
        let _enter = span.enter();

        let mut staged = vg.clone();
        let layer = staged.insert_layer(origin, VolumeStatus::CACHE, CORIG_SUFFIX)?;
        let seg = staged.first_segment(origin)?.id();
        staged.retype_segment(seg, cache_type, Some(settings))?;
        staged.attach_pool(seg, pool)?;
        *vg = staged;

        tracing::info!(
            pool = %vg.volume_name(pool),
            layer = %vg.volume_name(layer),
            "attached cache pool"
        );
        Ok(origin)
    }

    /// [`attach`](Self::attach), then commit with the cached volume as primary
    pub fn attach_and_commit(
        &self,
        lock: &VgLockGuard,
        vg: &mut VolumeGroup,
        pool: VolumeId,
        origin: VolumeId,
    ) -> Result<VolumeId> {
        let cached = self.attach(lock, vg, pool, origin)?;
        self.commit_and_apply(lock, vg, cached, &[])?;
        Ok(cached)
    }
}
