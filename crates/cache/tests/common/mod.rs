//! Shared harness for cache integration tests
//!
//! The recording wrappers forward to the in-memory store and the simulated
//! device mapper and append every call to one shared journal, so tests can
//! assert on the exact order in which metadata and the live mapping were
//! touched.

#![allow(dead_code)]

use cachevol_activation::{
    dm_name, BlockInfo, CacheStatusSource, DeviceMapper, PolicyInfo, SimulatedDeviceMapper,
};
use cachevol_cache::CacheContext;
use cachevol_core::{Error, Result, VgName, VolumeName};
use cachevol_metadata::{
    CacheMode, CacheSettings, MemoryMetadataStore, MetadataStore, SegmentTypeRegistry,
    VolumeGroup, VolumeId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write { seqno: u64 },
    Commit { seqno: u64, suspended: Vec<String> },
    Activate(String),
    Deactivate(String),
    Suspend(String),
    Resume(String),
    Policy { device: String, policy: String },
    Blocks { device: String, dirty: u64 },
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub struct RecordingStore {
    inner: MemoryMetadataStore,
    dm: Arc<SimulatedDeviceMapper>,
    journal: Journal,
    fail_commit: AtomicBool,
}

impl RecordingStore {
    /// Make the next commit fail without touching committed metadata
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }
}

impl MetadataStore for RecordingStore {
    fn write(&self, vg: &VolumeGroup) -> Result<()> {
        self.inner.write(vg)?;
        self.journal.lock().push(Event::Write { seqno: vg.seqno() });
        Ok(())
    }

    fn commit(&self, vg: &VolumeGroup) -> Result<()> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::metadata(vg.name(), "commit", "disk full"));
        }
        self.inner.commit(vg)?;
        self.journal.lock().push(Event::Commit {
            seqno: vg.seqno(),
            suspended: self.dm.suspended_devices(),
        });
        Ok(())
    }

    fn load(&self, vg_name: &str) -> Result<VolumeGroup> {
        self.inner.load(vg_name)
    }

    fn exists(&self, vg_name: &str) -> bool {
        self.inner.exists(vg_name)
    }
}

pub struct RecordingDevices {
    inner: Arc<SimulatedDeviceMapper>,
    journal: Journal,
}

impl RecordingDevices {
    fn record(&self, vg: &VolumeGroup, lv: VolumeId, event: fn(String) -> Event) {
        let device = dm_name(vg.name(), &vg.volume_name(lv));
        self.journal.lock().push(event(device));
    }
}

impl DeviceMapper for RecordingDevices {
    fn activate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        self.inner.activate(vg, lv)?;
        self.record(vg, lv, Event::Activate);
        Ok(())
    }

    fn deactivate(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        self.inner.deactivate(vg, lv)?;
        self.record(vg, lv, Event::Deactivate);
        Ok(())
    }

    fn suspend(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        self.inner.suspend(vg, lv)?;
        self.record(vg, lv, Event::Suspend);
        Ok(())
    }

    fn resume(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<()> {
        self.inner.resume(vg, lv)?;
        self.record(vg, lv, Event::Resume);
        Ok(())
    }

    fn is_active(&self, vg: &VolumeGroup, lv: VolumeId) -> bool {
        self.inner.is_active(vg, lv)
    }
}

impl CacheStatusSource for RecordingDevices {
    fn policy_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<PolicyInfo> {
        let info = self.inner.policy_info(vg, lv)?;
        self.journal.lock().push(Event::Policy {
            device: dm_name(vg.name(), &vg.volume_name(lv)),
            policy: info.name.clone(),
        });
        Ok(info)
    }

    fn block_info(&self, vg: &VolumeGroup, lv: VolumeId) -> Result<BlockInfo> {
        let info = self.inner.block_info(vg, lv)?;
        self.journal.lock().push(Event::Blocks {
            device: dm_name(vg.name(), &vg.volume_name(lv)),
            dirty: info.dirty_blocks,
        });
        Ok(info)
    }
}

/// Everything one test needs, with a shared journal
pub struct Harness {
    pub registry: SegmentTypeRegistry,
    pub dm: Arc<SimulatedDeviceMapper>,
    pub store: RecordingStore,
    pub devices: RecordingDevices,
    pub journal: Journal,
}

pub struct Layout {
    pub origin: VolumeId,
    pub pool: VolumeId,
}

impl Harness {
    pub fn new() -> Self {
        let journal: Journal = Arc::default();
        let dm = Arc::new(SimulatedDeviceMapper::new());
        Self {
            registry: SegmentTypeRegistry::builtin(),
            store: RecordingStore {
                inner: MemoryMetadataStore::new(),
                dm: Arc::clone(&dm),
                journal: Arc::clone(&journal),
                fail_commit: AtomicBool::new(false),
            },
            devices: RecordingDevices {
                inner: Arc::clone(&dm),
                journal: Arc::clone(&journal),
            },
            dm,
            journal,
        }
    }

    pub fn ctx(&self) -> CacheContext<'_> {
        CacheContext::new(&self.registry, &self.store, &self.devices, &self.devices)
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().clone()
    }

    pub fn clear(&self) {
        self.journal.lock().clear();
    }

    /// A group holding `data` (linear, `extents` long) and a writeback pool `fast`
    pub fn populate(&self, vg_name: &str, extents: u64) -> (VolumeGroup, Layout) {
        let mut vg = VolumeGroup::new(&VgName::new(vg_name).unwrap());
        let origin = vg
            .create_linear_volume(&VolumeName::new("data").unwrap(), extents, "/dev/sda", 0)
            .unwrap();
        let settings = CacheSettings {
            mode: CacheMode::Writeback,
            ..CacheSettings::default()
        };
        let pool = vg
            .create_cache_pool(
                &VolumeName::new("fast").unwrap(),
                4,
                1,
                "/dev/nvme0n1",
                0,
                settings,
            )
            .unwrap();
        self.store.create(&mut vg).unwrap();
        self.dm.activate_all(&vg).unwrap();
        self.clear();
        (vg, Layout { origin, pool })
    }
}

/// Position of the first event matching `pred`
pub fn position(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("event not found in {events:#?}"))
}
