//! Whole-graph consistency checks

use crate::model::SegmentArea;
use crate::segtype::SegmentKind;
use crate::vg::VolumeGroup;
use cachevol_core::{Error, Result};
use std::collections::HashSet;

impl VolumeGroup {
    /// Check every structural invariant of the group.
    ///
    /// Metadata stores call this before staging a write, so an inconsistent
    /// graph can never reach disk.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::invalid_metadata(&self.name, message));

        let mut names = HashSet::new();
        for volume in self.volumes.values() {
            if !names.insert(volume.name.as_str()) {
                return fail(format!("duplicate volume name '{}'", volume.name));
            }

            let mut next_extent = 0;
            for seg_id in &volume.segments {
                let Some(seg) = self.segments.get(seg_id) else {
                    return fail(format!("volume '{}' lists unknown {seg_id}", volume.name));
                };
                if seg.volume != volume.id {
                    return fail(format!(
                        "{seg_id} is listed by '{}' but owned by {}",
                        volume.name, seg.volume
                    ));
                }
                if seg.start_extent != next_extent {
                    return fail(format!(
                        "'{}' has a gap or overlap at extent {next_extent}",
                        volume.name
                    ));
                }
                next_extent += seg.extent_count;
            }

            for user in &volume.users {
                let Some(seg) = self.segments.get(user) else {
                    return fail(format!("'{}' lists unknown user {user}", volume.name));
                };
                let maps_volume = seg.areas.iter().any(|a| a.volume() == Some(volume.id));
                if !maps_volume && seg.pool != Some(volume.id) {
                    return fail(format!(
                        "'{}' lists {user} as a user but the segment does not reference it",
                        volume.name
                    ));
                }
            }

            if volume.is_cache() {
                let first = volume.segments.first().and_then(|s| self.segments.get(s));
                match first {
                    Some(seg) if seg.segtype.kind() == SegmentKind::Cache && seg.pool.is_some() => {}
                    _ => {
                        return fail(format!(
                            "cache volume '{}' does not start with a cache segment linked to a pool",
                            volume.name
                        ))
                    }
                }
            }
        }

        for seg in self.segments.values() {
            let Some(owner) = self.volumes.get(&seg.volume) else {
                return fail(format!("{} is owned by unknown {}", seg.id, seg.volume));
            };
            if !owner.segments.contains(&seg.id) {
                return fail(format!("{} is not listed by its owner '{}'", seg.id, owner.name));
            }
            for area in &seg.areas {
                if let SegmentArea::Volume { volume, .. } = area {
                    match self.volumes.get(volume) {
                        Some(sub) if sub.users.contains(&seg.id) => {}
                        Some(sub) => {
                            return fail(format!(
                                "{} maps '{}' but is missing from its users",
                                seg.id, sub.name
                            ))
                        }
                        None => return fail(format!("{} maps unknown {volume}", seg.id)),
                    }
                }
            }
            if let Some(pool) = seg.pool {
                match self.volumes.get(&pool) {
                    Some(p) if p.users.contains(&seg.id) => {}
                    _ => {
                        return fail(format!(
                            "{} references pool {pool} which does not list it",
                            seg.id
                        ))
                    }
                }
            }
            if seg.segtype.kind() == SegmentKind::Cache {
                if let Some(sub) = seg.sub_volume(0) {
                    if self.volumes.get(&sub).is_some_and(|v| v.is_cache_type()) {
                        return fail(format!("{} layers a cache over a cache volume", seg.id));
                    }
                }
            }
        }

        Ok(())
    }
}
