use crate::context::CacheContext;
use crate::controller::CacheController;
use cachevol_activation::SimulatedDeviceMapper;
use cachevol_core::{VgName, VolumeName};
use cachevol_metadata::{
    CacheMode, CacheSettings, MemoryMetadataStore, MetadataStore, SegmentTypeRegistry,
    VolumeGroup, VolumeId,
};
use cachevol_utils::VgLockGuard;

pub(crate) struct Layout {
    pub origin: VolumeId,
    pub pool: VolumeId,
}

/// Registry, store and simulated mapper shared by one test
pub(crate) struct Env {
    pub registry: SegmentTypeRegistry,
    pub store: MemoryMetadataStore,
    pub dm: SimulatedDeviceMapper,
}

impl Env {
    pub fn new() -> Self {
        Self::with_drain_rate(1)
    }

    pub fn with_drain_rate(blocks_per_query: u64) -> Self {
        Self {
            registry: SegmentTypeRegistry::builtin(),
            store: MemoryMetadataStore::new(),
            dm: SimulatedDeviceMapper::new().with_drain_rate(blocks_per_query),
        }
    }

    pub fn ctx(&self) -> CacheContext<'_> {
        CacheContext::new(&self.registry, &self.store, &self.dm, &self.dm)
    }

    /// `data` (10 linear extents) and a writeback pool `fast`, committed and active
    pub fn populated(&self, vg_name: &str) -> (VolumeGroup, Layout) {
        let mut vg = VolumeGroup::new(&VgName::new(vg_name).unwrap());
        let origin = vg
            .create_linear_volume(&VolumeName::new("data").unwrap(), 10, "/dev/sda", 0)
            .unwrap();
        let settings = CacheSettings {
            mode: CacheMode::Writeback,
            policy_args: vec![("migration_threshold".to_string(), "2048".to_string())],
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
        (vg, Layout { origin, pool })
    }

    /// [`populated`](Self::populated) with `fast` attached to `data`
    pub fn attached(&self, vg_name: &str, lock: &VgLockGuard) -> (VolumeGroup, Layout) {
        let (mut vg, layout) = self.populated(vg_name);
        CacheController::new(self.ctx())
            .attach_and_commit(lock, &mut vg, layout.pool, layout.origin)
            .unwrap();
        (vg, layout)
    }
}
