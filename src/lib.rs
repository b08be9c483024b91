//! `dm-engine`: an in-process device-mapper — a virtual block device that
//! routes I/O against a logical sector space to pluggable target handlers,
//! with suspend/resume semantics and completion-hook chaining (spec §1).
//!
//! The crate does not talk to a real block layer or device-node filesystem;
//! those are out-of-scope collaborators (spec §1 Non-goals). What it gives a
//! host is the registry, mapping table, dispatcher, and suspend/activate
//! controller — the part of device-mapper that is genuinely reusable logic
//! independent of any particular kernel or storage stack.

pub mod completion;
pub mod config;
pub mod constants;
pub mod control;
pub mod deferred;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod hotplug;
pub mod io_hook;
pub mod ioctl;
pub mod logging;
pub mod mapping;
pub mod registry;
pub mod request;
pub mod target;
pub mod targets;

use std::sync::Arc;

use parking_lot::RwLock;

pub use config::DmConfig;
pub use error::{DmError, DmResult};

use crate::{
    constants::DM_MAJOR,
    device::MappedDevice,
    dispatch::Submission,
    io_hook::HookPool,
    ioctl::{DmIoctl, DmIoctlResult},
    mapping::MappingTable,
    registry::Registry,
    request::{DeviceId, Request},
};

/// Top-level handle: one registry, one I/O hook pool, one config. A process
/// typically owns a single `DeviceMapper`, the way it would own a single
/// `/dev/mapper` control instance.
pub struct DeviceMapper {
    registry: RwLock<Registry>,
    hook_pool: Arc<HookPool>,
    config: DmConfig,
}

impl DeviceMapper {
    pub fn new(config: DmConfig) -> Self {
        let registry = RwLock::new(Registry::new(config.max_devices, DM_MAJOR, config.default_read_ahead));
        let hook_pool = Arc::new(HookPool::new(config.hook_pool_capacity));
        Self {
            registry,
            hook_pool,
            config,
        }
    }

    pub fn config(&self) -> &DmConfig {
        &self.config
    }

    // -- Administrative operations (spec §6 "Administrative operations") --

    pub fn create(&self, name: impl Into<String>, minor: Option<u32>) -> DmResult<DeviceId> {
        control::create(&self.registry, &self.config, name.into(), minor)
    }

    pub fn remove(&self, minor: u32) -> DmResult<()> {
        control::remove(&self.registry, &self.config, minor)
    }

    /// Activates `minor` against `table`. Returns requests that were
    /// sitting in the deferred queue and have now been (re-)mapped to a
    /// lower device — the caller must submit these to real I/O and call
    /// `complete` on each once that finishes, exactly as it would for the
    /// `Forward` outcome of `submit_request`.
    pub fn activate(&self, minor: u32, table: MappingTable) -> DmResult<Vec<Request>> {
        control::activate(&self.registry, &self.hook_pool, minor, table)
    }

    pub fn suspend(&self, minor: u32) -> DmResult<()> {
        control::suspend(&self.registry, minor)
    }

    pub fn deactivate(&self, minor: u32) -> DmResult<()> {
        control::deactivate(&self.registry, minor)
    }

    // -- Upper-layer operations (spec §6 "Upper-layer operations") --

    pub fn open(&self, minor: u32) -> DmResult<()> {
        control::open(&self.registry, minor)
    }

    pub fn close(&self, minor: u32) -> DmResult<()> {
        control::close(&self.registry, minor)
    }

    pub fn ioctl(&self, minor: u32, cmd: DmIoctl) -> DmResult<DmIoctlResult> {
        ioctl::handle(&self.registry, &self.config, minor, cmd)
    }

    /// The dispatcher entry point (spec §4.4). See `Submission` for what the
    /// caller owes the returned value.
    pub fn submit_request(&self, request: Request) -> DmResult<Submission> {
        dispatch::submit(&self.registry, &self.hook_pool, request)
    }

    /// Looks up a device by minor and runs `f` against a read-only view of
    /// it under the registry reader lock.
    pub fn with_device<T>(&self, minor: u32, f: impl FnOnce(&MappedDevice) -> T) -> DmResult<T> {
        let guard = self.registry.read();
        let device = guard
            .find_by_minor(minor)
            .ok_or(DmError::NoSuchDevice { minor })?;
        Ok(f(device))
    }
}
