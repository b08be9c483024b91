//! The fixed ioctl surface (spec §4.8, §6), modeled as a closed enum rather
//! than raw numeric commands — there is no control-plane boundary shim in
//! this crate translating an arbitrary integer into one of these, so
//! "unknown command" can't arise through the typed API itself (spec's
//! "Supplemented features" note on this).

use parking_lot::RwLock;

use crate::{
    config::DmConfig,
    device::DeviceState,
    error::{DmError, DmResult},
    registry::Registry,
    request::{DeviceId, Request, Rw},
    target::TargetFlags,
};

#[derive(Debug, Clone, Copy)]
pub enum DmIoctl {
    Geometry,
    Size,
    GetReadAhead,
    SetReadAhead(u32),
    FlushBuffers,
    ReReadPartitionTable,
    Bmap { logical_sector: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub heads: u32,
    pub sectors: u32,
    pub cylinders: u32,
}

#[derive(Debug)]
pub enum DmIoctlResult {
    Geometry(Geometry),
    Size(u64),
    ReadAhead(u32),
    Bmap { rdev: DeviceId, rsector: u64 },
    Ack,
}

pub fn handle(
    registry: &RwLock<Registry>,
    config: &DmConfig,
    minor: u32,
    cmd: DmIoctl,
) -> DmResult<DmIoctlResult> {
    match cmd {
        DmIoctl::Geometry => {
            let guard = registry.read();
            let device = guard
                .find_by_minor(minor)
                .ok_or(DmError::NoSuchDevice { minor })?;
            let table = device.table().ok_or(DmError::NoMappingTable {
                name: device.name().to_string(),
            })?;
            let per_cylinder = u64::from(config.geometry_heads) * u64::from(config.geometry_sectors);
            let cylinders = (table.size_in_sectors() / per_cylinder.max(1)) as u32;
            Ok(DmIoctlResult::Geometry(Geometry {
                heads: config.geometry_heads,
                sectors: config.geometry_sectors,
                cylinders,
            }))
        }

        DmIoctl::Size => {
            let guard = registry.read();
            let device = guard
                .find_by_minor(minor)
                .ok_or(DmError::NoSuchDevice { minor })?;
            let table = device.table().ok_or(DmError::NoMappingTable {
                name: device.name().to_string(),
            })?;
            Ok(DmIoctlResult::Size(table.size_in_sectors()))
        }

        DmIoctl::GetReadAhead => {
            let guard = registry.read();
            let device = guard
                .find_by_minor(minor)
                .ok_or(DmError::NoSuchDevice { minor })?;
            Ok(DmIoctlResult::ReadAhead(device.read_ahead()))
        }

        DmIoctl::SetReadAhead(value) => {
            let mut guard = registry.write();
            let device = guard
                .find_by_minor_mut(minor)
                .ok_or(DmError::NoSuchDevice { minor })?;
            device.set_read_ahead(value);
            Ok(DmIoctlResult::Ack)
        }

        // Privileged in the source; there is no permission model in scope
        // here (out-of-scope control-plane collaborator owns that), and the
        // actual buffer flush is a non-goal — this is the boundary stub.
        DmIoctl::FlushBuffers => {
            let guard = registry.read();
            guard
                .find_by_minor(minor)
                .ok_or(DmError::NoSuchDevice { minor })?;
            Ok(DmIoctlResult::Ack)
        }

        DmIoctl::ReReadPartitionTable => Err(DmError::InvalidArgument {
            reason: "partition re-read is not supported".into(),
        }),

        DmIoctl::Bmap { logical_sector } => bmap(registry, minor, logical_sector),
    }
}

/// Synthesizes a dummy request aimed at `logical_sector`, drives it through
/// one target's `map`, and returns the resolved `(rdev, rsector)` without
/// ever forwarding it (spec §4.8): no hook is allocated, `table.pending` is
/// untouched, and the synthetic request's `end_io` is never invoked for real
/// I/O — it only exists to satisfy `Request::new`'s signature.
fn bmap(registry: &RwLock<Registry>, minor: u32, logical_sector: u64) -> DmResult<DmIoctlResult> {
    let guard = registry.read();
    let device = guard
        .find_by_minor(minor)
        .ok_or(DmError::NoSuchDevice { minor })?;
    if device.state() != DeviceState::Active {
        return Err(DmError::NoMappingTable {
            name: device.name().to_string(),
        });
    }
    let table = device
        .table()
        .expect("Active device always carries a bound table");
    let idx = table.lookup(logical_sector).ok_or(DmError::InvalidArgument {
        reason: format!("sector {logical_sector} exceeds device size"),
    })?;
    let target = table.target(idx);
    if !target.flags().contains(TargetFlags::SUPPORTS_BMAP) {
        return Err(DmError::InvalidArgument {
            reason: format!("target '{}' does not support bmap", target.name()),
        });
    }

    let mut synthetic = Request::new(device.id(), logical_sector, 1, Rw::Read, |_, _| {});
    match target.map(&mut synthetic, Rw::Read) {
        crate::target::MapResult::Error(errno) => Err(DmError::TargetMapError {
            target: target.name().to_string(),
            source: errno,
        }),
        _ => Ok(DmIoctlResult::Bmap {
            rdev: synthetic.rdev,
            rsector: synthetic.rsector,
        }),
    }
}
