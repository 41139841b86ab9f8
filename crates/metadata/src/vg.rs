//! The volume group arena

use crate::model::{CacheSettings, Segment, SegmentArea, SegmentId, Volume, VolumeId};
use crate::segtype::{SegmentKind, SegmentType};
use crate::status::VolumeStatus;
use cachevol_core::{
    Error, Result, VgName, VolumeName, CDATA_SUFFIX, CMETA_SUFFIX, DEFAULT_EXTENT_SIZE,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A volume group: the unit of persisted metadata and of locking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub(crate) name: String,
    pub(crate) id: Uuid,
    /// Incremented on every metadata write
    pub(crate) seqno: u64,
    /// Extent size in sectors
    pub(crate) extent_size: u64,
    pub(crate) created: DateTime<Utc>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub(crate) volumes: IndexMap<VolumeId, Volume>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub(crate) segments: IndexMap<SegmentId, Segment>,
    pub(crate) next_volume: u32,
    pub(crate) next_segment: u32,
}

impl VolumeGroup {
    pub fn new(name: &VgName) -> Self {
        Self {
            name: name.to_string(),
            id: Uuid::new_v4(),
            seqno: 0,
            extent_size: DEFAULT_EXTENT_SIZE,
            created: Utc::now(),
            volumes: IndexMap::new(),
            segments: IndexMap::new(),
            next_volume: 0,
            next_segment: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    pub fn extent_size(&self) -> u64 {
        self.extent_size
    }

    /// Advance the sequence number ahead of a metadata write
    pub fn increment_seqno(&mut self) -> u64 {
        self.seqno += 1;
        self.seqno
    }

    pub fn volume(&self, id: VolumeId) -> Result<&Volume> {
        self.volumes
            .get(&id)
            .ok_or_else(|| Error::volume_not_found(&self.name, id.to_string()))
    }

    pub(crate) fn volume_mut(&mut self, id: VolumeId) -> Result<&mut Volume> {
        let vg = &self.name;
        self.volumes
            .get_mut(&id)
            .ok_or_else(|| Error::volume_not_found(vg, id.to_string()))
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.segments
            .get(&id)
            .ok_or_else(|| Error::invalid_metadata(&self.name, format!("unknown segment {id}")))
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        let vg = &self.name;
        self.segments
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_metadata(vg, format!("unknown segment {id}")))
    }

    pub fn volume_name(&self, id: VolumeId) -> String {
        self.volumes
            .get(&id)
            .map(|v| v.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn find_volume(&self, name: &str) -> Option<VolumeId> {
        self.volumes.values().find(|v| v.name == name).map(|v| v.id)
    }

    /// Like [`find_volume`](Self::find_volume) but reports a missing volume
    pub fn lookup(&self, name: &str) -> Result<VolumeId> {
        self.find_volume(name)
            .ok_or_else(|| Error::volume_not_found(&self.name, name))
    }

    pub fn volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Segments of a volume in address order
    pub fn segments_of(&self, id: VolumeId) -> Result<Vec<&Segment>> {
        self.volume(id)?
            .segments
            .iter()
            .map(|s| self.segment(*s))
            .collect()
    }

    pub fn first_segment(&self, id: VolumeId) -> Result<&Segment> {
        let volume = self.volume(id)?;
        let first = volume.segments.first().ok_or_else(|| {
            Error::invalid_metadata(&self.name, format!("volume {} has no segments", volume.name))
        })?;
        self.segment(*first)
    }

    /// Logical size of a volume in extents
    pub fn extent_count(&self, id: VolumeId) -> u64 {
        self.volumes
            .get(&id)
            .map(|v| {
                v.segments
                    .iter()
                    .filter_map(|s| self.segments.get(s))
                    .map(|s| s.extent_count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Create an empty user-visible volume
    pub fn create_volume(&mut self, name: &VolumeName) -> Result<VolumeId> {
        self.create_volume_raw(name.as_str(), VolumeStatus::VISIBLE)
    }

    /// Create an empty volume with arbitrary name and status
    pub(crate) fn create_volume_raw(&mut self, name: &str, status: VolumeStatus) -> Result<VolumeId> {
        if self.find_volume(name).is_some() {
            return Err(Error::graph_mutation(
                "create volume",
                name,
                format!("a volume named '{name}' already exists in '{}'", self.name),
            ));
        }
        let id = VolumeId(self.next_volume);
        self.next_volume += 1;
        self.volumes.insert(
            id,
            Volume {
                id,
                name: name.to_string(),
                status,
                segments: Vec::new(),
                users: BTreeSet::new(),
                created: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Append a segment to the end of `volume`, registering sub-volume users
    pub(crate) fn push_segment(
        &mut self,
        volume: VolumeId,
        segtype: SegmentType,
        extent_count: u64,
        areas: Vec<SegmentArea>,
        cache: Option<CacheSettings>,
    ) -> Result<SegmentId> {
        if extent_count == 0 {
            return Err(Error::graph_mutation(
                "add segment",
                self.volume_name(volume),
                "segment must span at least one extent",
            ));
        }
        for area in &areas {
            if let Some(sub) = area.volume() {
                self.volume(sub)?;
            }
        }
        let start_extent = self.extent_count(volume);
        let id = SegmentId(self.next_segment);
        self.next_segment += 1;

        let subs: Vec<VolumeId> = areas.iter().filter_map(SegmentArea::volume).collect();
        self.volume_mut(volume)?.segments.push(id);
        self.segments.insert(
            id,
            Segment {
                id,
                volume,
                start_extent,
                extent_count,
                segtype,
                areas,
                pool: None,
                cache,
            },
        );
        for sub in subs {
            self.volume_mut(sub)?.users.insert(id);
        }
        Ok(id)
    }

    /// Append a linear segment on a physical volume
    pub fn add_linear_segment(
        &mut self,
        volume: VolumeId,
        extent_count: u64,
        pv: &str,
        pe_start: u64,
    ) -> Result<SegmentId> {
        self.push_segment(
            volume,
            SegmentType::of(SegmentKind::Linear),
            extent_count,
            vec![SegmentArea::Physical {
                pv: pv.to_string(),
                start: pe_start,
            }],
            None,
        )
    }

    /// Create a linear volume in one step
    pub fn create_linear_volume(
        &mut self,
        name: &VolumeName,
        extent_count: u64,
        pv: &str,
        pe_start: u64,
    ) -> Result<VolumeId> {
        let id = self.create_volume(name)?;
        self.add_linear_segment(id, extent_count, pv, pe_start)?;
        Ok(id)
    }

    /// Create a cache pool with hidden `_cdata` and `_cmeta` sub-volumes
    pub fn create_cache_pool(
        &mut self,
        name: &VolumeName,
        data_extents: u64,
        metadata_extents: u64,
        pv: &str,
        pe_start: u64,
        settings: CacheSettings,
    ) -> Result<VolumeId> {
        let data_name = format!("{name}{CDATA_SUFFIX}");
        let meta_name = format!("{name}{CMETA_SUFFIX}");

        let data = self.create_volume_raw(&data_name, VolumeStatus::CACHE_POOL_DATA)?;
        self.add_linear_segment(data, data_extents, pv, pe_start)?;
        let meta = self.create_volume_raw(&meta_name, VolumeStatus::CACHE_POOL_METADATA)?;
        self.add_linear_segment(meta, metadata_extents, pv, pe_start + data_extents)?;

        let pool = self.create_volume_raw(
            name.as_str(),
            VolumeStatus::VISIBLE | VolumeStatus::CACHE_POOL,
        )?;
        self.push_segment(
            pool,
            SegmentType::of(SegmentKind::CachePool),
            data_extents,
            vec![
                SegmentArea::Volume {
                    volume: data,
                    start: 0,
                },
                SegmentArea::Volume {
                    volume: meta,
                    start: 0,
                },
            ],
            Some(settings),
        )?;
        Ok(pool)
    }
}
