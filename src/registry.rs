//! The device registry (spec §3 `Registry`, §4.6, C6): a fixed-capacity
//! table of `MappedDevice`s behind one reader/writer lock. Every
//! administrative operation and the dispatcher's own state check go through
//! this single lock — there is deliberately no per-device lock, matching
//! the source's single `_minor_lock` (spec §5).

use crate::{
    device::MappedDevice,
    error::{DmError, DmResult},
    request::DeviceId,
};

pub struct Registry {
    slots: Vec<Option<MappedDevice>>,
    major: u32,
    default_read_ahead: u32,
}

impl Registry {
    pub fn new(capacity: usize, major: u32, default_read_ahead: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            major,
            default_read_ahead,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn find_by_minor(&self, minor: u32) -> Option<&MappedDevice> {
        self.slots.get(minor as usize).and_then(|s| s.as_ref())
    }

    pub(crate) fn find_by_minor_mut(&mut self, minor: u32) -> Option<&mut MappedDevice> {
        self.slots.get_mut(minor as usize).and_then(|s| s.as_mut())
    }

    pub fn find_by_name(&self, name: &str) -> Option<&MappedDevice> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .find(|d| d.name() == name)
    }

    /// Allocates a new, `Created`-state device. `minor` pins a specific slot
    /// (fails with `MinorInUse` if occupied); `None` picks the lowest free
    /// slot (fails with `RegistryFull` if none remain).
    pub(crate) fn create(&mut self, name: String, minor: Option<u32>) -> DmResult<DeviceId> {
        if self.find_by_name(&name).is_some() {
            return Err(DmError::InvalidArgument {
                reason: format!("device '{name}' already exists"),
            });
        }

        let idx = match minor {
            Some(m) => {
                let idx = m as usize;
                if idx >= self.slots.len() {
                    return Err(DmError::InvalidArgument {
                        reason: format!("minor {m} exceeds registry capacity"),
                    });
                }
                if self.slots[idx].is_some() {
                    return Err(DmError::MinorInUse { minor: m });
                }
                idx
            }
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(DmError::RegistryFull {
                    max: self.slots.len(),
                })?,
        };

        let id = DeviceId::new(self.major, idx as u32);
        self.slots[idx] = Some(MappedDevice::new(id, name, self.default_read_ahead));
        Ok(id)
    }

    /// Removes a device, returning it to the caller. Refuses while open or
    /// still bound to a table (spec §4.6 `remove`'s busy guard).
    pub(crate) fn remove(&mut self, minor: u32) -> DmResult<MappedDevice> {
        let device = self
            .find_by_minor(minor)
            .ok_or(DmError::NoSuchDevice { minor })?;
        if device.use_count() > 0 {
            return Err(DmError::Busy {
                name: device.name().to_string(),
            });
        }
        if device.table().is_some() {
            return Err(DmError::Busy {
                name: device.name().to_string(),
            });
        }
        Ok(self.slots[minor as usize]
            .take()
            .expect("presence just checked above"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_picks_lowest_free_slot() {
        let mut r = Registry::new(4, 253, 64);
        let a = r.create("a".into(), None).unwrap();
        let b = r.create("b".into(), None).unwrap();
        assert_eq!(a.minor, 0);
        assert_eq!(b.minor, 1);
    }

    #[test]
    fn create_rejects_duplicate_name_and_occupied_minor() {
        let mut r = Registry::new(4, 253, 64);
        r.create("a".into(), Some(0)).unwrap();
        assert!(matches!(
            r.create("a".into(), Some(1)),
            Err(DmError::InvalidArgument { .. })
        ));
        assert!(matches!(
            r.create("b".into(), Some(0)),
            Err(DmError::MinorInUse { minor: 0 })
        ));
    }

    #[test]
    fn registry_full_when_capacity_exhausted() {
        let mut r = Registry::new(1, 253, 64);
        r.create("a".into(), None).unwrap();
        assert!(matches!(
            r.create("b".into(), None),
            Err(DmError::RegistryFull { max: 1 })
        ));
    }

    #[test]
    fn remove_refuses_while_open() {
        let mut r = Registry::new(4, 253, 64);
        r.create("a".into(), Some(0)).unwrap();
        r.find_by_minor_mut(0).unwrap().open();
        assert!(matches!(r.remove(0), Err(DmError::Busy { .. })));
        r.find_by_minor_mut(0).unwrap().close();
        assert!(r.remove(0).is_ok());
    }
}
