mod common;

use cachevol_activation::{dm_name, DeviceMapper, DeviceOp};
use cachevol_cache::{CacheController, FlushWaitPolicy};
use cachevol_core::{Error, ErrorClass, RecoveryHint, TransactionStep};
use cachevol_metadata::{MetadataStore, SegmentKind};
use cachevol_utils::VgLock;
use common::{position, Event, Harness};
use std::time::Duration;

fn no_wait() -> FlushWaitPolicy {
    FlushWaitPolicy::default().with_interval(Duration::ZERO)
}

#[test]
fn attach_commit_runs_write_suspend_commit_resume() {
    let lock = VgLock::acquire("order-attach").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("order-attach", 10);
    let data = dm_name("order-attach", "data");

    CacheController::new(h.ctx())
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap();

    assert_eq!(
        h.events(),
        vec![
            Event::Write { seqno: 2 },
            Event::Suspend(data.clone()),
            Event::Commit {
                seqno: 2,
                suspended: vec![data.clone()],
            },
            Event::Resume(data),
        ]
    );
    h.dm.verify(&vg).unwrap();
}

#[test]
fn detach_reads_zero_dirty_blocks_before_unlinking_pool() {
    let lock = VgLock::acquire("order-detach").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("order-detach", 10);
    let controller = CacheController::new(h.ctx()).with_flush_policy(no_wait());
    controller
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap();
    h.dm.set_dirty_blocks(&vg, layout.origin, 3);
    h.clear();

    controller.detach(&lock, &mut vg, layout.origin).unwrap();
    let events = h.events();
    let data = dm_name("order-detach", "data");
    let fast = dm_name("order-detach", "fast");
    let layer = dm_name("order-detach", "data_corig");

    // Cleaner swap is its own full cycle before any dirty reading
    assert_eq!(
        events[0],
        Event::Policy {
            device: data.clone(),
            policy: "mq".to_string()
        }
    );
    let swap_write = position(&events, |e| *e == Event::Write { seqno: 3 });
    let first_read = position(&events, |e| matches!(e, Event::Blocks { .. }));
    assert!(swap_write < first_read);

    let readings: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Blocks { dirty, .. } => Some(*dirty),
            _ => None,
        })
        .collect();
    assert_eq!(readings, vec![3, 2, 1, 0]);

    // The last status read before the detach write saw a clean cache
    let detach_write = position(&events, |e| *e == Event::Write { seqno: 4 });
    let last_read = events[..detach_write]
        .iter()
        .rev()
        .find_map(|e| match e {
            Event::Blocks { dirty, .. } => Some(*dirty),
            _ => None,
        });
    assert_eq!(last_read, Some(0));

    assert_eq!(
        events[detach_write..],
        [
            Event::Write { seqno: 4 },
            Event::Suspend(data.clone()),
            Event::Commit {
                seqno: 4,
                suspended: vec![
                    data.clone(),
                    dm_name("order-detach", "fast_cdata"),
                    dm_name("order-detach", "fast_cmeta"),
                    fast.clone(),
                    layer.clone(),
                ],
            },
            Event::Resume(data),
            Event::Resume(fast),
            Event::Activate(layer.clone()),
            Event::Deactivate(layer),
            Event::Write { seqno: 5 },
            Event::Commit {
                seqno: 5,
                suspended: vec![],
            },
        ]
    );
}

#[test]
fn every_protocol_commit_happens_while_primary_is_suspended() {
    let lock = VgLock::acquire("suspended-commit").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("suspended-commit", 10);
    let controller = CacheController::new(h.ctx()).with_flush_policy(no_wait());
    let data = dm_name("suspended-commit", "data");

    controller
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap();
    h.dm.set_dirty_blocks(&vg, layout.origin, 2);
    controller.detach(&lock, &mut vg, layout.origin).unwrap();

    let events = h.events();
    let commits: Vec<&Vec<String>> = events
        .iter()
        .filter_map(|e| match e {
            Event::Commit { suspended, .. } => Some(suspended),
            _ => None,
        })
        .collect();
    // attach, cleaner swap, detach; then the teardown persist
    assert_eq!(commits.len(), 4);
    for suspended in &commits[..3] {
        assert!(suspended.contains(&data), "commit without {data} suspended");
    }
    assert!(commits[3].is_empty());
}

#[test]
fn precondition_failures_touch_nothing() {
    let lock = VgLock::acquire("preconditions").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("preconditions", 10);
    let controller = CacheController::new(h.ctx());
    let before = vg.clone();

    let err = controller
        .attach(&lock, &mut vg, layout.origin, layout.origin)
        .unwrap_err();
    assert!(matches!(err, Error::NotACachePool { .. }));
    assert_eq!(err.class(), ErrorClass::Precondition);

    let err = controller
        .detach(&lock, &mut vg, layout.origin)
        .unwrap_err();
    assert!(matches!(err, Error::NotACacheVolume { .. }));

    let other = VgLock::acquire("preconditions-other").unwrap();
    let err = controller
        .attach(&other, &mut vg, layout.pool, layout.origin)
        .unwrap_err();
    assert!(matches!(err, Error::LockNotHeld { .. }));

    assert_eq!(vg, before);
    assert!(h.events().is_empty());
    assert_eq!(h.store.load("preconditions").unwrap(), before);
}

#[test]
fn attach_on_cached_origin_is_rejected() {
    let lock = VgLock::acquire("cached-origin").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("cached-origin", 10);
    let controller = CacheController::new(h.ctx());
    controller
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap();
    h.clear();
    let before = vg.clone();

    let err = controller
        .attach(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap_err();
    assert!(matches!(err, Error::OriginAlreadyCached { .. }));
    assert_eq!(vg, before);
    assert!(h.events().is_empty());
}

#[test]
fn pool_and_origin_scenario() {
    let lock = VgLock::acquire("scenario").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("scenario", 10);
    let controller = CacheController::new(h.ctx()).with_flush_policy(no_wait());

    let cached = controller
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap();
    let layer = vg.lookup("data_corig").unwrap();

    let seg = vg.first_segment(cached).unwrap();
    assert_eq!(seg.segtype().kind(), SegmentKind::Cache);
    assert_eq!(seg.extent_count(), 10);
    assert_eq!(seg.sub_volume(0), Some(layer));
    assert_eq!(seg.pool(), Some(layout.pool));
    assert!(vg.volume(layer).unwrap().users().contains(&seg.id()));
    assert!(vg.volume(layout.pool).unwrap().users().contains(&seg.id()));
    assert_eq!(vg.segments_of(layer).unwrap()[0].segtype().kind(), SegmentKind::Linear);

    let report = controller.detach(&lock, &mut vg, cached).unwrap();
    assert_eq!(report.flush_polls, 1);

    let mut names: Vec<&str> = vg.volumes().map(|v| v.name()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["data", "fast", "fast_cdata", "fast_cmeta"]);
    let segs = vg.segments_of(cached).unwrap();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].segtype().kind(), SegmentKind::Linear);
    assert_eq!(segs[0].extent_count(), 10);
    assert!(!vg.volume(layout.pool).unwrap().is_in_use());
    assert_eq!(h.store.load("scenario").unwrap(), vg);
    h.dm.verify(&vg).unwrap();
}

#[test]
fn resume_failure_after_commit_converges_on_retry() {
    let lock = VgLock::acquire("resume-fail").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("resume-fail", 10);
    h.dm.fail_next(DeviceOp::Resume, dm_name("resume-fail", "data"), "ioctl failed");

    let err = CacheController::new(h.ctx())
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap_err();
    assert_eq!(err.transaction_step(), Some(TransactionStep::Resume));
    assert_eq!(
        err.recovery_hint(),
        RecoveryHint::ResumeVolume {
            volume: "data".to_string()
        }
    );

    // Metadata is already authoritative; the live mapping lags behind
    let committed = h.store.load("resume-fail").unwrap();
    assert!(committed.volume(layout.origin).unwrap().is_cache());
    assert!(h.dm.is_suspended(&vg, layout.origin));
    assert!(h.dm.verify(&committed).is_ok());
    assert_eq!(
        h.dm.table(&vg, layout.origin).unwrap()[0].target.name(),
        "linear"
    );

    h.dm.resume(&committed, layout.origin).unwrap();
    h.dm.verify(&committed).unwrap();
    assert_eq!(
        h.dm.table(&vg, layout.origin).unwrap()[0].target.name(),
        "cache"
    );
}

#[test]
fn commit_failure_leaves_primary_suspended() {
    let lock = VgLock::acquire("commit-fail").unwrap();
    let h = Harness::new();
    let (mut vg, layout) = h.populate("commit-fail", 10);
    h.store.fail_next_commit();

    let err = CacheController::new(h.ctx())
        .attach_and_commit(&lock, &mut vg, layout.pool, layout.origin)
        .unwrap_err();
    assert_eq!(err.transaction_step(), Some(TransactionStep::Commit));
    assert!(err.needs_inspection());
    assert!(matches!(
        err.recovery_hint(),
        RecoveryHint::InspectLiveMapping { .. }
    ));

    assert!(h.dm.is_suspended(&vg, layout.origin));
    assert_eq!(h.store.load("commit-fail").unwrap().seqno(), 1);
    assert!(!h.events().iter().any(|e| matches!(e, Event::Resume(_))));
}
