//! Linear remap: rewrites `(rdev, rsector)` to an offset into a single
//! backing device, the simplest possible target (spec §1 examples).

use crate::{
    request::{Request, Rw},
    target::{MapResult, Target, TargetFlags},
};

pub struct LinearTarget {
    name: String,
    dev_major: u32,
    offset: u64,
}

impl LinearTarget {
    pub fn new(name: impl Into<String>, dev_major: u32, offset: u64) -> Self {
        Self {
            name: name.into(),
            dev_major,
            offset,
        }
    }
}

impl Target for LinearTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> TargetFlags {
        TargetFlags::SUPPORTS_BMAP
    }

    fn map(&self, req: &mut Request, _rw: Rw) -> MapResult {
        req.rdev.major = self.dev_major;
        req.rsector += self.offset;
        MapResult::Forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DeviceId;

    #[test]
    fn rewrites_rdev_and_rsector() {
        let target = LinearTarget::new("linearA", 8, 1000);
        let mut req = Request::new(DeviceId::new(253, 0), 50, 1, Rw::Read, |_, _| {});
        match target.map(&mut req, Rw::Read) {
            MapResult::Forwarded => {}
            _ => panic!("expected Forwarded"),
        }
        assert_eq!(req.rdev.major, 8);
        assert_eq!(req.rsector, 1050);
    }
}
