//! The literal end-to-end scenarios (spec §8 S1–S6), one test per scenario.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use dm_engine::{
    dispatch::Submission,
    mapping::{MappingTable, TargetEntry},
    request::{Request, Rw},
    targets::{error::ErrorTarget, linear::LinearTarget},
    DeviceMapper, DmConfig,
};

fn linear_table(entries: Vec<(u64, u32, u64)>) -> MappingTable {
    let entries = entries
        .into_iter()
        .map(|(high, major, offset)| {
            TargetEntry::new(
                high,
                Arc::new(LinearTarget::new(format!("lin{major}"), major, offset)),
            )
        })
        .collect();
    MappingTable::new(entries, 512).unwrap()
}

/// S1: linear routing across a two-target table, exact boundary sectors.
#[test]
fn s1_linear_routing() {
    let dm = DeviceMapper::new(DmConfig::default());
    let id = dm.create("s1", None).unwrap();
    dm.activate(
        id.minor,
        linear_table(vec![(99, 11, 1000), (299, 22, 5000)]),
    )
    .unwrap();

    let probe = |sector: u64| {
        let request = Request::new(id, sector, 1, Rw::Read, |_, _| {});
        match dm.submit_request(request).unwrap() {
            Submission::Forward(req) => (req.rdev.major, req.rsector),
            other => panic!("expected Forward, got {other:?}"),
        }
    };

    assert_eq!(probe(50), (11, 1050));
    assert_eq!(probe(99), (11, 1099));
    assert_eq!(probe(100), (22, 5000));
    assert_eq!(probe(299), (22, 5199));
}

/// S2: suspend blocks until the in-flight requests it's waiting on
/// complete, then the table is unbound.
#[test]
fn s2_suspend_drain() {
    let dm = Arc::new(DeviceMapper::new(DmConfig::default()));
    let id = dm.create("s2", None).unwrap();
    dm.activate(id.minor, linear_table(vec![(999, 11, 0)]))
        .unwrap();

    let mut in_flight = Vec::new();
    for sector in 0..10u64 {
        let request = Request::new(id, sector, 1, Rw::Read, |_, _| {});
        match dm.submit_request(request).unwrap() {
            Submission::Forward(req) => in_flight.push(req),
            other => panic!("expected Forward, got {other:?}"),
        }
    }

    // Hold back 3, complete the other 7 immediately.
    let held: Vec<_> = in_flight.drain(0..3).collect();
    for req in in_flight {
        req.complete(true);
    }

    let suspend_done = Arc::new(AtomicBool::new(false));
    let dm2 = dm.clone();
    let flag = suspend_done.clone();
    let handle = std::thread::spawn(move || {
        dm2.suspend(id.minor).unwrap();
        flag.store(true, Ordering::SeqCst);
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(!suspend_done.load(Ordering::SeqCst), "suspend must block with I/O outstanding");

    for req in held {
        req.complete(true);
    }
    handle.join().unwrap();
    assert!(suspend_done.load(Ordering::SeqCst));

    dm.with_device(id.minor, |d| assert!(d.table().is_none()))
        .unwrap();
}

/// S3: requests arriving while suspended are deferred, then all replayed
/// against the new table on activate, with no double completions.
#[test]
fn s3_deferred_replay() {
    let dm = DeviceMapper::new(DmConfig::default());
    let id = dm.create("s3", None).unwrap();
    dm.activate(id.minor, linear_table(vec![(999, 11, 0)]))
        .unwrap();
    dm.suspend(id.minor).unwrap();

    let completions = Arc::new(AtomicU32::new(0));
    for sector in 0..5u64 {
        let c = completions.clone();
        let request = Request::new(id, sector, 1, Rw::Read, move |_info, _ok| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        match dm.submit_request(request).unwrap() {
            Submission::Deferred => {}
            other => panic!("expected Deferred, got {other:?}"),
        }
    }
    dm.with_device(id.minor, |d| {
        assert_eq!(d.state(), dm_engine::device::DeviceState::Suspended)
    })
    .unwrap();

    let forwarded = dm
        .activate(id.minor, linear_table(vec![(999, 22, 7000)]))
        .unwrap();
    assert_eq!(forwarded.len(), 5);
    for req in forwarded {
        assert_eq!(req.rdev.major, 22);
        req.complete(true);
    }
    assert_eq!(completions.load(Ordering::SeqCst), 5);
}

/// S4: a target that always fails `map` causes the request to fail and
/// leaves `pending` untouched.
#[test]
fn s4_error_propagation() {
    let dm = DeviceMapper::new(DmConfig::default());
    let id = dm.create("s4", None).unwrap();
    let target = Arc::new(ErrorTarget::failing("boom", nix::errno::Errno::EIO));
    let table = MappingTable::new(vec![TargetEntry::new(99, target)], 512).unwrap();
    dm.activate(id.minor, table).unwrap();

    let pending_before = dm
        .with_device(id.minor, |d| d.table().unwrap().pending_count())
        .unwrap();

    let ok = Arc::new(AtomicBool::new(true));
    let ok2 = ok.clone();
    let request = Request::new(id, 10, 1, Rw::Read, move |_info, uptodate| {
        ok2.store(uptodate, Ordering::SeqCst);
    });
    match dm.submit_request(request).unwrap() {
        Submission::Completed => {}
        other => panic!("expected Completed, got {other:?}"),
    }
    assert!(!ok.load(Ordering::SeqCst));

    let pending_after = dm
        .with_device(id.minor, |d| d.table().unwrap().pending_count())
        .unwrap();
    assert_eq!(pending_before, pending_after);
}

/// S5: a target's `err` hook claims ownership of a failed completion; the
/// trampoline must not invoke the original `end_io` until the target
/// finishes it itself.
#[test]
fn s5_completion_error_with_handler() {
    let dm = DeviceMapper::new(DmConfig::default());
    let id = dm.create("s5", None).unwrap();
    let target = Arc::new(ErrorTarget::handling_completions("handler"));
    let table = MappingTable::new(vec![TargetEntry::new(99, target.clone())], 512).unwrap();
    dm.activate(id.minor, table).unwrap();

    let final_value = Arc::new(AtomicU64::new(u64::MAX));
    let fv = final_value.clone();
    let request = Request::new(id, 10, 1, Rw::Read, move |_info, uptodate| {
        fv.store(uptodate as u64, Ordering::SeqCst);
    });
    let forwarded = match dm.submit_request(request).unwrap() {
        Submission::Forward(req) => req,
        other => panic!("expected Forward, got {other:?}"),
    };

    forwarded.complete(false);
    assert_eq!(
        final_value.load(Ordering::SeqCst),
        u64::MAX,
        "end_io must not run until the target finishes the stashed completion"
    );
    assert!(target.has_stashed_completion());

    target.complete_stashed(true);
    assert_eq!(final_value.load(Ordering::SeqCst), 1);
}

/// S6: `remove` refuses a device with an open handle; succeeds once closed,
/// and the freed minor is reusable.
#[test]
fn s6_remove_guard() {
    let dm = DeviceMapper::new(DmConfig::default());
    let id = dm.create("s6", Some(3)).unwrap();
    dm.activate(id.minor, linear_table(vec![(99, 11, 0)]))
        .unwrap();
    dm.open(id.minor).unwrap();

    assert!(dm.remove(id.minor).is_err());
    dm.with_device(id.minor, |_| ()).expect("slot still occupied");

    dm.close(id.minor).unwrap();
    dm.deactivate(id.minor).unwrap();
    dm.remove(id.minor).unwrap();

    let id2 = dm.create("s6-again", Some(3)).unwrap();
    assert_eq!(id2.minor, 3);
}
