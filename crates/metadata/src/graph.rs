//! Graph primitives over the volume group arena
//!
//! Every primitive here keeps forward references (segment areas, pool links)
//! and back references (volume `users` sets) in agreement. They mutate memory
//! only; persisting the result is the caller's job.

use crate::model::{CacheSettings, SegmentArea, SegmentId, VolumeId};
use crate::segtype::{SegmentKind, SegmentType};
use crate::status::VolumeStatus;
use crate::vg::VolumeGroup;
use cachevol_core::{Error, Result};

impl VolumeGroup {
    /// Insert a hidden layer volume beneath `target`.
    ///
    /// The new volume, named `<target><suffix>`, takes over all of `target`'s
    /// segments. `target` keeps its id and name and receives one linear
    /// segment of the same length whose only area is the layer. `status` is
    /// added to `target`. Returns the layer volume.
    pub fn insert_layer(
        &mut self,
        target: VolumeId,
        status: VolumeStatus,
        suffix: &str,
    ) -> Result<VolumeId> {
        let target_name = self.volume(target)?.name.clone();
        let layer_err = |message: String| Error::LayerInsertion {
            volume: target_name.clone(),
            message,
        };

        let extents = self.extent_count(target);
        if extents == 0 {
            return Err(layer_err("volume has no extents to move".to_string()));
        }

        let layer_name = format!("{target_name}{suffix}");
        if self.find_volume(&layer_name).is_some() {
            return Err(layer_err(format!("volume '{layer_name}' already exists")));
        }

        let layer = self.create_volume_raw(&layer_name, VolumeStatus::empty())?;

        let moved = std::mem::take(&mut self.volume_mut(target)?.segments);
        for seg in &moved {
            self.segment_mut(*seg)?.volume = layer;
        }
        self.volume_mut(layer)?.segments = moved;

        self.push_segment(
            target,
            SegmentType::of(SegmentKind::Linear),
            extents,
            vec![SegmentArea::Volume {
                volume: layer,
                start: 0,
            }],
            None,
        )
        .map_err(|e| layer_err(e.to_string()))?;

        self.volume_mut(target)?.status |= status;
        tracing::debug!(lv = %target_name, layer = %layer_name, extents, "inserted layer");
        Ok(layer)
    }

    /// Change a segment's type, optionally replacing its cache settings
    pub fn retype_segment(
        &mut self,
        seg: SegmentId,
        segtype: SegmentType,
        cache: Option<CacheSettings>,
    ) -> Result<()> {
        let segment = self.segment_mut(seg)?;
        segment.segtype = segtype;
        segment.cache = cache;
        Ok(())
    }

    /// Switch the cache policy of a segment, clearing policy arguments
    pub fn set_cache_policy(&mut self, seg: SegmentId, policy: &str) -> Result<()> {
        let owner = self.segment(seg)?.volume;
        let owner_name = self.volume_name(owner);
        let settings = self.segment_mut(seg)?.cache.as_mut().ok_or_else(|| {
            Error::graph_mutation("set cache policy", owner_name, "segment has no cache settings")
        })?;
        settings.set_policy(policy);
        Ok(())
    }

    /// Link `pool` to `seg`; a pool serves at most one segment
    pub fn attach_pool(&mut self, seg: SegmentId, pool: VolumeId) -> Result<()> {
        let owner = self.segment(seg)?.volume;
        let pool_name = self.volume_name(pool);
        let attach_err = |message: String| Error::PoolAttach {
            pool: pool_name.clone(),
            volume: self.volume_name(owner),
            message,
        };

        if let Some(existing) = self.segment(seg)?.pool {
            return Err(attach_err(format!(
                "segment already references pool '{}'",
                self.volume_name(existing)
            )));
        }
        let pool_volume = self.volume(pool)?;
        if pool_volume.is_in_use() {
            return Err(attach_err("pool is already in use".to_string()));
        }
        if pool == owner {
            return Err(attach_err("a volume cannot be its own pool".to_string()));
        }

        self.segment_mut(seg)?.pool = Some(pool);
        self.volume_mut(pool)?.users.insert(seg);
        Ok(())
    }

    /// Break the pool link of `seg`, returning the pool it referenced
    pub fn detach_pool(&mut self, seg: SegmentId) -> Result<VolumeId> {
        let owner = self.segment(seg)?.volume;
        let pool = self.segment(seg)?.pool.ok_or_else(|| Error::PoolDetach {
            volume: self.volume_name(owner),
            message: "segment has no pool".to_string(),
        })?;

        if !self.volume_mut(pool)?.users.remove(&seg) {
            return Err(Error::PoolDetach {
                volume: self.volume_name(owner),
                message: format!(
                    "pool '{}' does not list the segment as a user",
                    self.volume_name(pool)
                ),
            });
        }
        self.segment_mut(seg)?.pool = None;
        Ok(pool)
    }

    pub fn set_visible(&mut self, volume: VolumeId, visible: bool) -> Result<()> {
        self.volume_mut(volume)?
            .status
            .set(VolumeStatus::VISIBLE, visible);
        Ok(())
    }

    pub fn clear_status(&mut self, volume: VolumeId, status: VolumeStatus) -> Result<()> {
        self.volume_mut(volume)?.status.remove(status);
        Ok(())
    }

    /// Drop `seg` from the users set of `volume`
    pub fn remove_segment_user(&mut self, volume: VolumeId, seg: SegmentId) -> Result<()> {
        let name = self.volume_name(volume);
        if !self.volume_mut(volume)?.users.remove(&seg) {
            return Err(Error::graph_mutation(
                "remove segment user",
                name,
                format!("{seg} is not a user of this volume"),
            ));
        }
        Ok(())
    }

    /// Replace the segments of `to` with all segments of `from`.
    ///
    /// The segments `to` owned beforehand are discarded; they must already be
    /// unlinked (no pool, not registered as a user of any volume). `from` is
    /// left with no segments.
    pub fn move_segments(&mut self, to: VolumeId, from: VolumeId) -> Result<()> {
        let to_name = self.volume_name(to);
        let discarded = self.volume(to)?.segments.clone();
        self.volume(from)?;

        for seg in &discarded {
            let segment = self.segment(*seg)?;
            if segment.pool.is_some() {
                return Err(Error::graph_mutation(
                    "move segments",
                    &to_name,
                    format!("{seg} still references a pool"),
                ));
            }
            if let Some(sub) = segment
                .areas
                .iter()
                .filter_map(SegmentArea::volume)
                .find(|v| self.volumes.get(v).is_some_and(|v| v.users.contains(seg)))
            {
                return Err(Error::graph_mutation(
                    "move segments",
                    &to_name,
                    format!("{seg} is still a user of '{}'", self.volume_name(sub)),
                ));
            }
        }

        for seg in &discarded {
            self.segments.shift_remove(seg);
        }
        let moved = std::mem::take(&mut self.volume_mut(from)?.segments);
        for seg in &moved {
            self.segment_mut(*seg)?.volume = to;
        }
        self.volume_mut(to)?.segments = moved;
        Ok(())
    }

    /// Append a segment mapping to no storage (`error`, `zero`)
    pub fn add_virtual_segment(
        &mut self,
        volume: VolumeId,
        extent_count: u64,
        segtype: SegmentType,
    ) -> Result<SegmentId> {
        if !segtype.kind().is_virtual() {
            return Err(Error::graph_mutation(
                "add virtual segment",
                self.volume_name(volume),
                format!("'{segtype}' is not a virtual segment type"),
            ));
        }
        self.push_segment(volume, segtype, extent_count, Vec::new(), None)
    }

    /// Delete a volume and its segments from the group
    pub fn remove_volume(&mut self, volume: VolumeId) -> Result<()> {
        let name = self.volume_name(volume);
        if self.volume(volume)?.is_in_use() {
            return Err(Error::graph_mutation(
                "remove volume",
                name,
                "volume is still mapped by other segments",
            ));
        }

        let segments = self.volume(volume)?.segments.clone();
        for seg in segments {
            if self.segment(seg)?.pool.is_some() {
                self.detach_pool(seg)?;
            }
            let subs: Vec<VolumeId> = self
                .segment(seg)?
                .areas
                .iter()
                .filter_map(SegmentArea::volume)
                .collect();
            for sub in subs {
                if let Some(v) = self.volumes.get_mut(&sub) {
                    v.users.remove(&seg);
                }
            }
            self.segments.shift_remove(&seg);
        }
        self.volumes.shift_remove(&volume);
        tracing::debug!(lv = %name, "removed volume");
        Ok(())
    }
}
