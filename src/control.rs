//! The suspend/activate controller (spec §3, §4.6, C8): administrative
//! state transitions plus `flush_deferred` (§4.3). Every transition table
//! row from §4.6 is a function here; each acquires the registry writer lock
//! for its own critical section and follows the source's lock-release
//! pattern where the spec calls for it (quiesce wait, `fsync`) rather than
//! holding the writer lock across a potentially unbounded block.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{
    config::DmConfig,
    deferred::replay,
    device::DeviceState,
    dispatch::{self, Submission},
    error::{DmError, DmResult},
    hotplug::{self, Action},
    io_hook::HookPool,
    mapping::MappingTable,
    registry::Registry,
    request::Request,
};

/// `create(name, minor?)` (spec §4.6 row 1): allocate a registry slot and
/// fire the hotplug `add` notification.
pub fn create(
    registry: &RwLock<Registry>,
    config: &DmConfig,
    name: String,
    minor: Option<u32>,
) -> DmResult<crate::request::DeviceId> {
    let id = registry.write().create(name.clone(), minor)?;
    info!(name, minor = id.minor, "device created");
    hotplug::notify(config.hotplug_helper.as_deref(), Action::Add, &name);
    Ok(id)
}

/// `remove(device)` (spec §4.6 row 6): only legal from `Created` or
/// `Suspended` (both leave `table` unbound), and only with no open handles —
/// enforced by `Registry::remove` itself.
pub fn remove(registry: &RwLock<Registry>, config: &DmConfig, minor: u32) -> DmResult<()> {
    let removed = registry.write().remove(minor)?;
    info!(name = removed.name(), minor, "device removed");
    hotplug::notify(config.hotplug_helper.as_deref(), Action::Remove, removed.name());
    Ok(())
}

/// `activate(T)` (spec §4.6 rows 2 and 4): legal from `Created` or
/// `Suspended`, guarded on a non-empty table. Binds the table, flushes any
/// deferred queue, and returns whatever deferred requests the flush mapped
/// to a `Forward` outcome — the caller must drive those to the real block
/// layer exactly as it would any freshly submitted request.
pub fn activate(
    registry: &RwLock<Registry>,
    hook_pool: &Arc<HookPool>,
    minor: u32,
    table: MappingTable,
) -> DmResult<Vec<Request>> {
    if table.num_targets() == 0 {
        return Err(DmError::InvalidArgument {
            reason: "cannot activate an empty mapping table".into(),
        });
    }
    let table = Arc::new(table);

    let deferred = {
        let mut guard = registry.write();
        let device = guard
            .find_by_minor_mut(minor)
            .ok_or(DmError::NoSuchDevice { minor })?;
        match device.state() {
            DeviceState::Created | DeviceState::Suspended => {}
            other => {
                return Err(DmError::InvalidArgument {
                    reason: format!("activate is not valid from state {other:?}"),
                });
            }
        }
        device.bind_table(table);
        device.set_state(DeviceState::Active);
        debug!(minor, "device activated");
        device.deferred.take_all()
    };

    let mut forwarded = Vec::new();
    replay(deferred, |request, _rw| {
        match dispatch::submit(registry, hook_pool, request) {
            Ok(Submission::Forward(req)) => forwarded.push(req),
            Ok(Submission::Completed) | Ok(Submission::Deferred) => {}
            Err(error) => {
                tracing::warn!(%error, minor, "deferred request failed to re-dispatch");
            }
        }
    });

    Ok(forwarded)
}

/// `suspend()` (spec §4.6 row 3, §4.6 last paragraph): clears `Active`,
/// blocks with no lock held until the table drains, then re-acquires the
/// writer lock to clear the binding. The unlocked wait is the point: a
/// drain can take arbitrarily long, and holding the writer lock across it
/// would stall every other device's dispatch too (spec §5).
pub fn suspend(registry: &RwLock<Registry>, minor: u32) -> DmResult<()> {
    let table = {
        let mut guard = registry.write();
        let device = guard
            .find_by_minor_mut(minor)
            .ok_or(DmError::NoSuchDevice { minor })?;
        if device.state() != DeviceState::Active {
            return Err(DmError::InvalidArgument {
                reason: "suspend is only valid from the Active state".into(),
            });
        }
        device.set_state(DeviceState::Suspending);
        device
            .table()
            .expect("Active device always carries a bound table")
            .clone()
    };

    table.wait_until_drained();

    let mut guard = registry.write();
    let device = guard
        .find_by_minor_mut(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    device.clear_table();
    device.set_state(DeviceState::Suspended);
    debug!(minor, "device suspended");
    Ok(())
}

/// `deactivate()` (spec §4.6 row 5): preserves the source's
/// release-sync-reacquire-recheck pattern verbatim (spec §9 "`fsync` during
/// deactivate"). The actual underlying-device sync is a non-goal here (the
/// block submission primitive is out of scope) — `fsync_underlying` is the
/// seam a host embedding this crate would fill in; the locking shape around
/// it is what this function preserves.
pub fn deactivate(registry: &RwLock<Registry>, minor: u32) -> DmResult<()> {
    {
        let guard = registry.read();
        let device = guard
            .find_by_minor(minor)
            .ok_or(DmError::NoSuchDevice { minor })?;
        if device.state() != DeviceState::Active {
            return Err(DmError::InvalidArgument {
                reason: "deactivate is only valid from the Active state".into(),
            });
        }
        if device.use_count() > 0 {
            return Err(DmError::Busy {
                name: device.name().to_string(),
            });
        }
    }

    fsync_underlying();

    let mut guard = registry.write();
    let device = guard
        .find_by_minor_mut(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    if device.use_count() > 0 {
        return Err(DmError::Busy {
            name: device.name().to_string(),
        });
    }
    device.clear_table();
    device.set_state(DeviceState::Created);
    debug!(minor, "device deactivated");
    Ok(())
}

/// Underlying-device sync, performed outside the writer lock because it may
/// block for a long time (spec §9). No real block device exists in this
/// crate's scope; a host would replace this with an actual `fsync`/flush
/// call against the device it mapped.
fn fsync_underlying() {}

/// `open(minor)` (spec §6): fails if the slot is empty or the device is not
/// `Active` (reusing `NoMappingTable`, since "not active" and "no bound
/// table" are the same condition under this state machine).
pub fn open(registry: &RwLock<Registry>, minor: u32) -> DmResult<()> {
    let mut guard = registry.write();
    let device = guard
        .find_by_minor_mut(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    if !device.is_active() {
        return Err(DmError::NoMappingTable {
            name: device.name().to_string(),
        });
    }
    device.open();
    Ok(())
}

/// `close(minor)` (spec §6).
pub fn close(registry: &RwLock<Registry>, minor: u32) -> DmResult<()> {
    let mut guard = registry.write();
    let device = guard
        .find_by_minor_mut(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    device.close();
    Ok(())
}
