//! Mapping tables derived from volume group metadata

use cachevol_core::{Error, Result};
use cachevol_metadata::{
    CacheMode, SegmentArea, SegmentKind, VolumeGroup, VolumeId,
};
use std::fmt;

/// Device name of a volume: `<vg>-<lv>` with hyphens inside either part doubled
pub fn dm_name(vg: &str, lv: &str) -> String {
    format!("{}-{}", vg.replace('-', "--"), lv.replace('-', "--"))
}

/// Target of one table line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Linear {
        device: String,
        offset: u64,
    },
    Cache {
        metadata: String,
        data: String,
        origin: String,
        chunk_size: u64,
        mode: CacheMode,
        policy: String,
        policy_args: Vec<(String, String)>,
    },
    CachePool {
        data: String,
        metadata: String,
    },
    Error,
    Zero,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Linear { .. } => "linear",
            Target::Cache { .. } => "cache",
            Target::CachePool { .. } => "cache-pool",
            Target::Error => "error",
            Target::Zero => "zero",
        }
    }

    /// Devices this target maps onto
    pub fn devices(&self) -> Vec<&str> {
        match self {
            Target::Linear { device, .. } => vec![device],
            Target::Cache {
                metadata,
                data,
                origin,
                ..
            } => vec![metadata, data, origin],
            Target::CachePool { data, metadata } => vec![data, metadata],
            Target::Error | Target::Zero => Vec::new(),
        }
    }
}

/// One line of a mapping table; offsets and lengths are in sectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLine {
    pub start: u64,
    pub length: u64,
    pub target: Target,
}

impl fmt::Display for TableLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.start, self.length, self.target.name())?;
        match &self.target {
            Target::Linear { device, offset } => write!(f, " {device} {offset}"),
            Target::Cache {
                metadata,
                data,
                origin,
                chunk_size,
                mode,
                policy,
                policy_args,
            } => {
                let mode = match mode {
                    CacheMode::Writethrough => "writethrough",
                    CacheMode::Writeback => "writeback",
                };
                write!(
                    f,
                    " {metadata} {data} {origin} {chunk_size} 1 {mode} {policy} {}",
                    policy_args.len() * 2
                )?;
                for (key, value) in policy_args {
                    write!(f, " {key} {value}")?;
                }
                Ok(())
            }
            Target::CachePool { data, metadata } => write!(f, " {data} {metadata}"),
            Target::Error | Target::Zero => Ok(()),
        }
    }
}

fn area_device(vg: &VolumeGroup, area: &SegmentArea) -> (String, u64) {
    match area {
        SegmentArea::Physical { pv, start } => (pv.clone(), start * vg.extent_size()),
        SegmentArea::Volume { volume, start } => (
            dm_name(vg.name(), &vg.volume_name(*volume)),
            start * vg.extent_size(),
        ),
    }
}

/// Build the table `lv` would load from `vg`
pub fn build_table(vg: &VolumeGroup, lv: VolumeId) -> Result<Vec<TableLine>> {
    let name = vg.volume_name(lv);
    let extent_size = vg.extent_size();
    let mut lines = Vec::new();

    for seg in vg.segments_of(lv)? {
        let start = seg.start_extent() * extent_size;
        let length = seg.extent_count() * extent_size;
        let malformed = |message: &str| Error::device(dm_name(vg.name(), &name), "load", message);

        let target = match seg.segtype().kind() {
            SegmentKind::Linear | SegmentKind::Striped => {
                let area = seg
                    .areas()
                    .first()
                    .ok_or_else(|| malformed("segment has no areas"))?;
                let (device, offset) = area_device(vg, area);
                Target::Linear { device, offset }
            }
            SegmentKind::Cache => {
                let pool = seg.pool().ok_or_else(|| malformed("cache segment has no pool"))?;
                let origin = seg
                    .sub_volume(0)
                    .ok_or_else(|| malformed("cache segment has no origin"))?;
                let pool_seg = vg.first_segment(pool)?;
                let data = pool_seg
                    .sub_volume(0)
                    .ok_or_else(|| malformed("pool has no data volume"))?;
                let metadata = pool_seg
                    .sub_volume(1)
                    .ok_or_else(|| malformed("pool has no metadata volume"))?;
                let settings = seg
                    .cache_settings()
                    .or_else(|| pool_seg.cache_settings())
                    .ok_or_else(|| malformed("cache segment has no settings"))?;
                Target::Cache {
                    metadata: dm_name(vg.name(), &vg.volume_name(metadata)),
                    data: dm_name(vg.name(), &vg.volume_name(data)),
                    origin: dm_name(vg.name(), &vg.volume_name(origin)),
                    chunk_size: settings.chunk_size,
                    mode: settings.mode,
                    policy: settings.policy.clone(),
                    policy_args: settings.policy_args.clone(),
                }
            }
            SegmentKind::CachePool => {
                let data = seg
                    .sub_volume(0)
                    .ok_or_else(|| malformed("pool has no data volume"))?;
                let metadata = seg
                    .sub_volume(1)
                    .ok_or_else(|| malformed("pool has no metadata volume"))?;
                Target::CachePool {
                    data: dm_name(vg.name(), &vg.volume_name(data)),
                    metadata: dm_name(vg.name(), &vg.volume_name(metadata)),
                }
            }
            SegmentKind::Error => Target::Error,
            SegmentKind::Zero => Target::Zero,
        };
        lines.push(TableLine {
            start,
            length,
            target,
        });
    }
    Ok(lines)
}

/// Volumes `lv` depends on in `vg`: mapped sub-volumes and linked pools
pub fn dependencies(vg: &VolumeGroup, lv: VolumeId) -> Result<Vec<VolumeId>> {
    let mut deps = Vec::new();
    for seg in vg.segments_of(lv)? {
        for sub in seg.areas().iter().filter_map(SegmentArea::volume) {
            if !deps.contains(&sub) {
                deps.push(sub);
            }
        }
        if let Some(pool) = seg.pool() {
            if !deps.contains(&pool) {
                deps.push(pool);
            }
        }
    }
    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachevol_core::{VgName, VolumeName};
    use cachevol_metadata::CacheSettings;

    #[test]
    fn test_dm_name_escapes_hyphens() {
        assert_eq!(dm_name("vg0", "data"), "vg0-data");
        assert_eq!(dm_name("my-vg", "my-lv"), "my--vg-my--lv");
    }

    #[test]
    fn test_linear_table() {
        let mut vg = VolumeGroup::new(&VgName::new("vg0").unwrap());
        let lv = vg
            .create_linear_volume(&VolumeName::new("data").unwrap(), 2, "/dev/sda", 3)
            .unwrap();
        vg.add_linear_segment(lv, 1, "/dev/sdb", 0).unwrap();

        let table = build_table(&vg, lv).unwrap();
        let rendered: Vec<String> = table.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["0 16384 linear /dev/sda 24576", "16384 8192 linear /dev/sdb 0"]
        );
        assert!(dependencies(&vg, lv).unwrap().is_empty());
    }

    #[test]
    fn test_pool_dependencies() {
        let mut vg = VolumeGroup::new(&VgName::new("vg0").unwrap());
        let pool = vg
            .create_cache_pool(
                &VolumeName::new("fast").unwrap(),
                4,
                1,
                "/dev/nvme0n1",
                0,
                CacheSettings::default(),
            )
            .unwrap();
        let deps: Vec<String> = dependencies(&vg, pool)
            .unwrap()
            .into_iter()
            .map(|v| vg.volume_name(v))
            .collect();
        assert_eq!(deps, vec!["fast_cdata", "fast_cmeta"]);
        assert_eq!(
            build_table(&vg, pool).unwrap()[0].to_string(),
            "0 32768 cache-pool vg0-fast_cdata vg0-fast_cmeta"
        );
    }
}
