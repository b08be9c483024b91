//! The dispatcher (spec §3 `Dispatcher`, §4.4, C7) and the completion
//! trampoline it installs on every forwarded request (§4.5).
//!
//! Submitting a request to an actual block layer is out of scope (spec's
//! non-goals) — there is no `generic_make_request` collaborator here. A
//! forwarded request is handed back to the caller, rewritten and with its
//! `end_io` replaced by the trampoline, for whatever host I/O path drives
//! real hardware; the host is expected to call `Request::complete` on it
//! once that I/O finishes. This mirrors the division of labor the source
//! itself has between `dm_request` (decide + rewrite) and the block layer
//! (actually perform the I/O).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    completion::DeferredCompletion,
    error::{DmError, DmResult},
    io_hook::{Hook, HookPool},
    registry::Registry,
    request::Request,
    target::MapResult,
};

/// Outcome of submitting a request to the mapper.
#[derive(Debug)]
pub enum Submission {
    /// Mapped synchronously (by a target, or because no target claims the
    /// sector) and already completed; nothing further to do.
    Completed,
    /// The owning device was not `Active`; queued for replay on resume.
    Deferred,
    /// Mapped to a lower device. `rdev`/`rsector` have been rewritten and
    /// `end_io` now points at the dispatcher's trampoline — submit this to
    /// the real block layer and call `complete` on it when that I/O
    /// finishes.
    Forward(Request),
}

/// Dispatches one request against the registry (spec §4.4).
///
/// Holds the reader lock across the `Active` fast path's whole
/// lookup/map/`inc_pending` sequence — the common case — rather than
/// dropping it after taking a `(state, table)` snapshot. `suspend()` cannot
/// flip a device out of `Active` until every reader has released the lock
/// (spec §5's "single reader/writer lock"), so a dispatch that has already
/// observed `Active` is guaranteed to finish incrementing `pending` before
/// any concurrent `suspend()` can read it; without that, a target's `map`
/// could run after `suspend()` had already returned, violating invariant 4.
/// When the device is not `Active`, re-does the whole check-and-act under
/// one writer-lock acquisition instead of dropping and reacquiring,
/// closing the race spec §9 flags in the source between "observed
/// suspended" and "enqueued".
pub fn submit(
    registry: &RwLock<Registry>,
    hook_pool: &Arc<HookPool>,
    request: Request,
) -> DmResult<Submission> {
    let rw = request.rw();
    let minor = request.rdev.minor;

    let guard = registry.read();
    let device = guard
        .find_by_minor(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    if device.is_active() {
        let table = device
            .table()
            .expect("Active device always carries a bound table")
            .clone();
        let result = dispatch_against(table, hook_pool, request, rw);
        drop(guard);
        return result;
    }
    drop(guard);

    let mut guard = registry.write();
    let device = guard
        .find_by_minor_mut(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    if device.is_active() {
        let table = device
            .table()
            .expect("Active device always carries a bound table")
            .clone();
        let result = dispatch_against(table, hook_pool, request, rw);
        drop(guard);
        return result;
    }
    device.deferred.push(request, rw);
    Ok(Submission::Deferred)
}

fn dispatch_against(
    table: Arc<crate::mapping::MappingTable>,
    hook_pool: &Arc<HookPool>,
    mut request: Request,
    rw: crate::request::Rw,
) -> DmResult<Submission> {
    let target_idx = match table.lookup(request.rsector) {
        Some(idx) => idx,
        None => {
            request.complete(false);
            return Ok(Submission::Completed);
        }
    };
    let target = table.target(target_idx).clone();
    // Captured before `target.map` mutates `rdev`/`rsector` on forward: this
    // is what the upper layer's original `end_io` must see, not the
    // rewritten coordinates the lower layer forwards against (spec §4.1
    // "Target" mutates the request in place; §4.5 restores the saved
    // `end_io` against the request's original identity).
    let info = request.info();

    match target.map(&mut request, rw) {
        MapResult::CompletedSync => {
            request.complete(true);
            Ok(Submission::Completed)
        }
        MapResult::Error(errno) => {
            tracing::debug!(
                target = target.name(),
                %errno,
                "target failed to map request synchronously"
            );
            request.complete(false);
            Ok(Submission::Completed)
        }
        MapResult::Forwarded => {
            let end_io = request
                .take_end_io()
                .expect("a live request always carries an end_io");

            match Hook::try_new(hook_pool, table.clone(), target, rw, end_io, info) {
                Ok(hook) => {
                    table.inc_pending();
                    request.set_end_io(Box::new(move |_info, uptodate| complete_hook(hook, uptodate)));
                    Ok(Submission::Forward(request))
                }
                Err(end_io) => {
                    let capacity = hook_pool.capacity();
                    end_io(info, false);
                    Err(DmError::AllocFailure { capacity })
                }
            }
        }
    }
}

/// The completion trampoline (spec §4.5): runs when the forwarded request's
/// real I/O finishes. On success, finishes the completion directly. On
/// failure, offers the target first refusal via `err`; if it declines, the
/// trampoline finishes it itself with `uptodate: false`.
fn complete_hook(hook: Hook, uptodate: bool) {
    let Hook {
        table,
        target,
        rw,
        end_io,
        info,
        ..
    } = hook;
    let completion = DeferredCompletion::new(table, end_io, info);

    if uptodate {
        completion.finish(true);
        return;
    }

    match target.err(&info, rw, completion) {
        Ok(()) => {}
        Err(completion) => completion.finish(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapping::{MappingTable, TargetEntry},
        registry::Registry,
        request::{DeviceId, Rw},
        targets::{error::ErrorTarget, linear::LinearTarget},
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    fn registry_with_active_device(table: MappingTable) -> (RwLock<Registry>, DeviceId) {
        let mut registry = Registry::new(4, 253, 64);
        let id = registry.create("dev0".into(), Some(0)).unwrap();
        let device = registry.find_by_minor_mut(0).unwrap();
        device.bind_table(Arc::new(table));
        device.set_state(crate::device::DeviceState::Active);
        (RwLock::new(registry), id)
    }

    #[test]
    fn completion_sees_original_sector_not_rewritten_one() {
        let table = MappingTable::new(
            vec![TargetEntry::new(
                299,
                Arc::new(LinearTarget::new("lin", 7, 1000)),
            )],
            512,
        )
        .unwrap();
        let (registry, id) = registry_with_active_device(table);
        let pool = Arc::new(HookPool::new(4));

        let seen_sector = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let seen2 = seen_sector.clone();
        let request = Request::new(id, 50, 1, Rw::Read, move |info, _ok| {
            seen2.store(info.rsector, Ordering::SeqCst);
        });

        match submit(&registry, &pool, request).unwrap() {
            Submission::Forward(req) => {
                // Forwarded request still carries the rewritten sector...
                assert_eq!(req.rsector, 1050);
                req.complete(true);
            }
            _ => panic!("expected Forward"),
        }
        // ...but the upper layer's end_io sees the original one.
        assert_eq!(seen_sector.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn forwarded_request_rewrites_target_and_installs_trampoline() {
        let table = MappingTable::new(
            vec![TargetEntry::new(
                299,
                Arc::new(LinearTarget::new("lin", 7, 100)),
            )],
            512,
        )
        .unwrap();
        let (registry, id) = registry_with_active_device(table);
        let pool = Arc::new(HookPool::new(4));

        let request = Request::new(id, 10, 1, Rw::Read, |_, _| {});
        match submit(&registry, &pool, request).unwrap() {
            Submission::Forward(req) => {
                assert_eq!(req.rdev.major, 7);
                assert_eq!(req.rsector, 110);
            }
            _ => panic!("expected Forward"),
        }
    }

    #[test]
    fn unmapped_sector_completes_with_failure() {
        let table = MappingTable::new(
            vec![TargetEntry::new(99, Arc::new(LinearTarget::new("lin", 0, 0)))],
            512,
        )
        .unwrap();
        let (registry, id) = registry_with_active_device(table);
        let pool = Arc::new(HookPool::new(4));

        let ok = Arc::new(AtomicBool::new(true));
        let ok2 = ok.clone();
        let request = Request::new(id, 500, 1, Rw::Read, move |_, uptodate| {
            ok2.store(uptodate, Ordering::SeqCst);
        });
        match submit(&registry, &pool, request).unwrap() {
            Submission::Completed => {}
            _ => panic!("expected Completed"),
        }
        assert!(!ok.load(Ordering::SeqCst));
    }

    #[test]
    fn inactive_device_defers_request() {
        let mut registry = Registry::new(4, 253, 64);
        let id = registry.create("dev0".into(), Some(0)).unwrap();
        let registry = RwLock::new(registry);
        let pool = Arc::new(HookPool::new(4));

        let request = Request::new(id, 0, 1, Rw::Read, |_, _| {});
        match submit(&registry, &pool, request).unwrap() {
            Submission::Deferred => {}
            _ => panic!("expected Deferred"),
        }
        assert_eq!(registry.read().find_by_minor(0).unwrap().deferred.len(), 1);
    }

    #[test]
    fn failed_completion_reaches_target_err_hook() {
        let target = Arc::new(ErrorTarget::handling_completions("eh"));
        let table = MappingTable::new(vec![TargetEntry::new(99, target.clone())], 512).unwrap();
        let (registry, id) = registry_with_active_device(table);
        let pool = Arc::new(HookPool::new(4));

        let request = Request::new(id, 0, 1, Rw::Read, |_, _| {});
        let forwarded = match submit(&registry, &pool, request).unwrap() {
            Submission::Forward(req) => req,
            _ => panic!("expected Forward"),
        };

        forwarded.complete(false);
        assert!(target.has_stashed_completion());
        target.complete_stashed(false);
    }

    #[test]
    fn hook_pool_exhaustion_fails_request_and_allocation() {
        let table = MappingTable::new(
            vec![TargetEntry::new(99, Arc::new(LinearTarget::new("lin", 0, 0)))],
            512,
        )
        .unwrap();
        let (registry, id) = registry_with_active_device(table);
        let pool = Arc::new(HookPool::new(0));

        let ok = Arc::new(AtomicBool::new(true));
        let ok2 = ok.clone();
        let request = Request::new(id, 0, 1, Rw::Read, move |_, uptodate| {
            ok2.store(uptodate, Ordering::SeqCst);
        });
        let err = submit(&registry, &pool, request).unwrap_err();
        assert!(matches!(err, DmError::AllocFailure { .. }));
        assert!(!ok.load(Ordering::SeqCst));
    }
}
