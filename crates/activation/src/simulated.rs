//! In-process stand-in for the kernel device mapper
//!
//! Devices are keyed by [`dm_name`]. Each keeps the table it last loaded and
//! the devices that table maps onto, so suspend follows the *live*
//! dependencies while resume follows the dependencies of the metadata it is
//! handed. A cache pool unlinked by a detach is therefore left suspended until
//! someone resumes it by name, exactly as with the real mapper.

use crate::mapper::DeviceMapper;
use crate::status::{BlockInfo, CacheStatusSource, PolicyInfo};
use crate::table::{build_table, dependencies, dm_name, TableLine, Target};
use cachevol_core::{Error, Result, CLEANER_POLICY};
use cachevol_metadata::{VolumeGroup, VolumeId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Primitive that can be made to fail with [`SimulatedDeviceMapper::fail_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    Activate,
    Deactivate,
    Suspend,
    Resume,
    Status,
}

impl DeviceOp {
    fn as_str(self) -> &'static str {
        match self {
            DeviceOp::Activate => "activate",
            DeviceOp::Deactivate => "deactivate",
            DeviceOp::Suspend => "suspend",
            DeviceOp::Resume => "resume",
            DeviceOp::Status => "status",
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    table: Vec<TableLine>,
    deps: Vec<String>,
    suspended: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    used: u64,
    dirty: u64,
}

#[derive(Debug)]
struct State {
    nodes: IndexMap<String, Node>,
    counters: HashMap<String, Counters>,
    drain_per_query: u64,
    failures: HashMap<(DeviceOp, String), String>,
}

impl State {
    fn take_failure(&mut self, op: DeviceOp, device: &str) -> Result<()> {
        match self.failures.remove(&(op, device.to_string())) {
            Some(message) => Err(Error::device(device, op.as_str(), message)),
            None => Ok(()),
        }
    }

    /// Load `lv` and everything its metadata reaches, leaving all of it running
    fn load_tree(&mut self, vg: &VolumeGroup, lv: VolumeId, seen: &mut HashSet<VolumeId>) -> Result<()> {
        if !seen.insert(lv) {
            return Ok(());
        }
        let name = dm_name(vg.name(), &vg.volume_name(lv));
        let table = build_table(vg, lv)?;
        let deps = dependencies(vg, lv)?;
        for dep in &deps {
            self.load_tree(vg, *dep, seen)?;
        }
        let deps = deps
            .into_iter()
            .map(|d| dm_name(vg.name(), &vg.volume_name(d)))
            .collect();
        tracing::trace!(device = %name, "loaded table");
        self.nodes.insert(
            name,
            Node {
                table,
                deps,
                suspended: false,
            },
        );
        Ok(())
    }

    fn suspend_tree(&mut self, device: &str, seen: &mut HashSet<String>) {
        if !seen.insert(device.to_string()) {
            return;
        }
        let Some(node) = self.nodes.get_mut(device) else {
            return;
        };
        node.suspended = true;
        for dep in node.deps.clone() {
            self.suspend_tree(&dep, seen);
        }
    }

    fn is_referenced(&self, device: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.deps.iter().any(|d| d == device))
    }

    fn cache_target(&self, device: &str) -> Option<&Target> {
        self.nodes
            .get(device)?
            .table
            .iter()
            .map(|l| &l.target)
            .find(|t| matches!(t, Target::Cache { .. }))
    }
}

/// Device mapper simulation backing tests and the command line front end
#[derive(Debug)]
pub struct SimulatedDeviceMapper {
    state: Mutex<State>,
}

impl Default for SimulatedDeviceMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDeviceMapper {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                nodes: IndexMap::new(),
                counters: HashMap::new(),
                drain_per_query: 1,
                failures: HashMap::new(),
            }),
        }
    }

    /// Dirty blocks written back per status query while the cleaner runs
    pub fn with_drain_rate(self, blocks_per_query: u64) -> Self {
        self.state.lock().drain_per_query = blocks_per_query;
        self
    }

    /// Set the dirty block count of a cached volume
    pub fn set_dirty_blocks(&self, vg: &VolumeGroup, lv: VolumeId, dirty: u64) {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        let mut state = self.state.lock();
        let counters = state.counters.entry(device).or_default();
        counters.dirty = dirty;
        counters.used = counters.used.max(dirty);
    }

    /// Make the next `op` on the named device fail
    pub fn fail_next(&self, op: DeviceOp, device: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .failures
            .insert((op, device.into()), message.into());
    }

    pub fn is_suspended(&self, vg: &VolumeGroup, lv: VolumeId) -> bool {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        self.state
            .lock()
            .nodes
            .get(&device)
            .is_some_and(|n| n.suspended)
    }

    /// Live table of a volume, if it is active
    pub fn table(&self, vg: &VolumeGroup, lv: VolumeId) -> Option<Vec<TableLine>> {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        self.state.lock().nodes.get(&device).map(|n| n.table.clone())
    }

    /// Names of every device currently present
    pub fn devices(&self) -> Vec<String> {
        self.state.lock().nodes.keys().cloned().collect()
    }

    pub fn suspended_devices(&self) -> Vec<String> {
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|(_, n)| n.suspended)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Check that every running device matches what `vg` describes
    pub fn verify(&self, vg: &VolumeGroup) -> Result<()> {
        let state = self.state.lock();
        for (device, node) in &state.nodes {
            if node.suspended {
                continue;
            }
            let lv = vg
                .volumes()
                .find(|v| dm_name(vg.name(), v.name()) == *device)
                .map(|v| v.id())
                .ok_or_else(|| Error::device(device, "verify", "no such volume in metadata"))?;
            if build_table(vg, lv)? != node.table {
                return Err(Error::device(device, "verify", "live table differs from metadata"));
            }
        }
        Ok(())
    }

    /// Activate every visible volume of `vg`
    pub fn activate_all(&self, vg: &VolumeGroup) -> Result<()> {
        let visible: Vec<VolumeId> = vg
            .volumes()
            .filter(|v| v.is_visible())
            .map(|v| v.id())
            .collect();
        for lv in visible {
            self.activate(vg, lv)?;
        }
        Ok(())
    }
}

impl DeviceMapper for SimulatedDeviceMapper {
    fn activate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Activate, &device)?;
        state.load_tree(vg, lv, &mut HashSet::new())?;
        tracing::debug!(device = %device, "activated");
        Ok(())
    }

    fn deactivate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Deactivate, &device)?;
        if !state.nodes.contains_key(&device) {
            return Ok(());
        }
        if state.is_referenced(&device) {
            return Err(Error::device(&device, "deactivate", "device is in use"));
        }

        let mut pending = vec![device.clone()];
        while let Some(next) = pending.pop() {
            let Some(node) = state.nodes.shift_remove(&next) else {
                continue;
            };
            state.counters.remove(&next);
            for dep in node.deps {
                let hidden = !vg
                    .volumes()
                    .any(|v| v.is_visible() && dm_name(vg.name(), v.name()) == dep);
                if hidden && !state.is_referenced(&dep) {
                    pending.push(dep);
                }
            }
        }
        tracing::debug!(device = %device, "deactivated");
        Ok(())
    }

    fn suspend(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Suspend, &device)?;
        state.suspend_tree(&device, &mut HashSet::new());
        tracing::debug!(device = %device, "suspended");
        Ok(())
    }

    fn resume(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Resume, &device)?;
        if !state.nodes.contains_key(&device) {
            return Ok(());
        }
        state.load_tree(vg, lv, &mut HashSet::new())?;
        tracing::debug!(device = %device, "resumed");
        Ok(())
    }

    fn is_active(&self, vg: &VolumeGroup, lv: VolumeId) -> bool {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        self.state.lock().nodes.contains_key(&device)
    }
}

impl CacheStatusSource for SimulatedDeviceMapper {
    fn policy_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<PolicyInfo> {
        let name = vg.volume_name(lv);
        let device = dm_name(vg.name(), &name);
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Status, &device)?;
        match state.cache_target(&device) {
            Some(Target::Cache {
                policy,
                policy_args,
                ..
            }) => Ok(PolicyInfo {
                name: policy.clone(),
                args: policy_args.clone(),
            }),
            _ => Err(Error::status_query(name, "no live cache target")),
        }
    }

    fn block_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<BlockInfo> {
        let name = vg.volume_name(lv);
        let device = dm_name(vg.name(), &name);
        let mut state = self.state.lock();
        state.take_failure(DeviceOp::Status, &device)?;

        let (chunk_size, data, cleaning) = match state.cache_target(&device) {
            Some(Target::Cache {
                chunk_size,
                data,
                policy,
                ..
            }) => (*chunk_size, data.clone(), policy == CLEANER_POLICY),
            _ => return Err(Error::status_query(name, "no live cache target")),
        };
        let data_sectors: u64 = state
            .nodes
            .get(&data)
            .map(|n| n.table.iter().map(|l| l.length).sum())
            .unwrap_or(0);
        let running = state.nodes.get(&device).is_some_and(|n| !n.suspended);
        let drain = state.drain_per_query;

        let counters = state.counters.entry(device).or_default();
        let info = BlockInfo {
            block_size: chunk_size,
            total_blocks: data_sectors / chunk_size.max(1),
            used_blocks: counters.used,
            dirty_blocks: counters.dirty,
        };
        if cleaning && running {
            counters.dirty = counters.dirty.saturating_sub(drain);
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachevol_core::{VgName, VolumeName};
    use cachevol_metadata::CacheSettings;

    fn setup() -> (VolumeGroup, VolumeId, VolumeId) {
        let mut vg = VolumeGroup::new(&VgName::new("vg0").unwrap());
        let origin = vg
            .create_linear_volume(&VolumeName::new("data").unwrap(), 10, "/dev/sda", 0)
            .unwrap();
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
        (vg, origin, pool)
    }

    #[test]
    fn test_activate_loads_dependencies() {
        let (vg, _, pool) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.activate(&vg, pool).unwrap();

        let devices = dm.devices();
        assert!(devices.contains(&"vg0-fast".to_string()));
        assert!(devices.contains(&"vg0-fast_cdata".to_string()));
        assert!(devices.contains(&"vg0-fast_cmeta".to_string()));
        dm.verify(&vg).unwrap();
    }

    #[test]
    fn test_suspend_is_transitive_and_resume_follows_metadata() {
        let (vg, _, pool) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.activate(&vg, pool).unwrap();

        dm.suspend(&vg, pool).unwrap();
        let data = vg.lookup("fast_cdata").unwrap();
        assert!(dm.is_suspended(&vg, pool));
        assert!(dm.is_suspended(&vg, data));

        dm.resume(&vg, pool).unwrap();
        assert!(!dm.is_suspended(&vg, pool));
        assert!(!dm.is_suspended(&vg, data));
    }

    #[test]
    fn test_inactive_volume_is_left_alone() {
        let (vg, origin, _) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.suspend(&vg, origin).unwrap();
        dm.resume(&vg, origin).unwrap();
        assert!(!dm.is_active(&vg, origin));
    }

    #[test]
    fn test_deactivate_refuses_device_in_use() {
        let (vg, _, pool) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.activate(&vg, pool).unwrap();

        let data = vg.lookup("fast_cdata").unwrap();
        assert!(dm.deactivate(&vg, data).is_err());

        dm.deactivate(&vg, pool).unwrap();
        assert!(dm.devices().is_empty());
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let (vg, origin, _) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.fail_next(DeviceOp::Activate, "vg0-data", "no memory");

        let err = dm.activate(&vg, origin).unwrap_err();
        assert!(matches!(err, Error::Device { operation: "activate", .. }));
        dm.activate(&vg, origin).unwrap();
    }

    #[test]
    fn test_status_requires_cache_target() {
        let (vg, origin, _) = setup();
        let dm = SimulatedDeviceMapper::new();
        dm.activate(&vg, origin).unwrap();
        assert!(matches!(
            dm.block_info(&vg, origin),
            Err(Error::StatusQuery { .. })
        ));
    }
}
