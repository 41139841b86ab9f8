use cachevol_activation::SimulatedDeviceMapper;
use cachevol_cache::{CacheContext, CacheController, FlushWaitPolicy};
use cachevol_core::{Error, VgName, VolumeName};
use cachevol_metadata::{
    CacheSettings, FileMetadataStore, MetadataStore, SegmentKind, SegmentTypeRegistry,
    VolumeGroup,
};
use cachevol_utils::VgLock;
use std::time::Duration;
use tempfile::TempDir;

fn seed(store: &FileMetadataStore) -> VolumeGroup {
    let mut vg = VolumeGroup::new(&VgName::new("vgfile").unwrap());
    vg.create_linear_volume(&VolumeName::new("data").unwrap(), 10, "/dev/sda", 0)
        .unwrap();
    vg.create_cache_pool(
        &VolumeName::new("fast").unwrap(),
        4,
        1,
        "/dev/nvme0n1",
        0,
        CacheSettings::default(),
    )
    .unwrap();
    store.create(&mut vg).unwrap();
    vg
}

#[test]
fn attach_and_detach_survive_reload_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileMetadataStore::new(temp_dir.path());
    seed(&store);

    let registry = SegmentTypeRegistry::builtin();
    let dm = SimulatedDeviceMapper::new();
    let controller = CacheController::new(CacheContext::new(&registry, &store, &dm, &dm))
        .with_flush_policy(FlushWaitPolicy::default().with_interval(Duration::ZERO));

    {
        let lock = VgLock::acquire_in(temp_dir.path(), "vgfile").unwrap();
        assert!(temp_dir.path().join("vgfile.lock").exists());

        let mut vg = store.load("vgfile").unwrap();
        dm.activate_all(&vg).unwrap();
        let pool = vg.lookup("fast").unwrap();
        let origin = vg.lookup("data").unwrap();
        controller
            .attach_and_commit(&lock, &mut vg, pool, origin)
            .unwrap();
    }
    // Released, not removed
    assert!(temp_dir.path().join("vgfile.lock").exists());

    let lock = VgLock::acquire_in(temp_dir.path(), "vgfile").unwrap();
    let mut vg = store.load("vgfile").unwrap();
    let cached = vg.lookup("data").unwrap();
    assert!(vg.volume(cached).unwrap().is_cache());
    assert_eq!(
        vg.first_segment(cached).unwrap().segtype().kind(),
        SegmentKind::Cache
    );

    let report = controller.detach(&lock, &mut vg, cached).unwrap();
    assert_eq!(report.removed_layer, "data_corig");

    let reloaded = store.load("vgfile").unwrap();
    assert_eq!(reloaded, vg);
    assert!(reloaded.find_volume("data_corig").is_none());
    assert!(!temp_dir.path().join("vgfile.json.pre").exists());
}

#[test]
fn second_lock_on_same_group_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    let _held = VgLock::acquire_in(temp_dir.path(), "vglocked").unwrap();

    let err = VgLock::acquire_in(temp_dir.path(), "vglocked").unwrap_err();
    assert!(matches!(err, Error::Lock { .. }));
}
