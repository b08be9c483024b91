//! The I/O hook pool (spec §3 `IOHook`, §4.2, C3): a fixed-size allocator
//! backing the hot path. `crossbeam`'s lock-free `ArrayQueue` stands in for
//! the slab: a hook "allocation" is really a permit popped from a bounded,
//! pre-filled queue, returned automatically when the hook drops. Allocation
//! never blocks — an empty queue means exhaustion, which the dispatcher
//! must treat as a fatal error for the affected request only (spec §4.2,
//! §7 `AllocFailure`).

use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

use crate::{
    mapping::MappingTable,
    request::{EndIo, RequestInfo, Rw},
    target::Target,
};

pub struct HookPool {
    permits: ArrayQueue<()>,
    capacity: usize,
}

impl HookPool {
    pub fn new(capacity: usize) -> Self {
        let permits = ArrayQueue::new(capacity.max(1));
        for _ in 0..capacity {
            // Queue was just sized to `capacity`; this cannot fail.
            let _ = permits.push(());
        }
        Self { permits, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.len()
    }

    fn try_take_permit(self: &Arc<Self>) -> Option<HookPermit> {
        self.permits.pop().map(|()| HookPermit { pool: self.clone() })
    }
}

struct HookPermit {
    pool: Arc<HookPool>,
}

impl Drop for HookPermit {
    fn drop(&mut self) {
        // Queue was sized to its own capacity; returning a permit can never
        // overflow it as long as allocation count == free count, which the
        // `Hook` lifetime (one permit per live hook) guarantees.
        let _ = self.pool.permits.push(());
    }
}

/// A per-request shadow record created exactly when the dispatcher decides
/// to forward a request (spec §3 `IOHook`). Owns the upper layer's saved
/// `end_io`, the table and target the request was forwarded against, and
/// the permit that keeps it accounted for in the pool. Dropped by the
/// completion trampoline once it has run.
pub(crate) struct Hook {
    pub table: Arc<MappingTable>,
    pub target: Arc<dyn Target>,
    pub rw: Rw,
    pub end_io: EndIo,
    pub info: RequestInfo,
    _permit: HookPermit,
}

impl Hook {
    /// Allocates a hook from `pool`. On exhaustion, hands `end_io` back
    /// unconsumed rather than dropping it, so the caller can still complete
    /// the request it belongs to (spec §4.2, §7 `AllocFailure`).
    pub fn try_new(
        pool: &Arc<HookPool>,
        table: Arc<MappingTable>,
        target: Arc<dyn Target>,
        rw: Rw,
        end_io: EndIo,
        info: RequestInfo,
    ) -> Result<Self, EndIo> {
        match pool.try_take_permit() {
            Some(permit) => Ok(Self {
                table,
                target,
                rw,
                end_io,
                info,
                _permit: permit,
            }),
            None => Err(end_io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{request::DeviceId, targets::linear::LinearTarget};

    fn dummy_table() -> Arc<MappingTable> {
        use crate::mapping::TargetEntry;
        Arc::new(
            MappingTable::new(
                vec![TargetEntry::new(99, Arc::new(LinearTarget::new("t", 0, 0)))],
                512,
            )
            .unwrap(),
        )
    }

    #[test]
    fn exhausted_pool_refuses_allocation() {
        let pool = Arc::new(HookPool::new(1));
        let table = dummy_table();
        let target: Arc<dyn Target> = Arc::new(LinearTarget::new("t", 0, 0));
        let info = RequestInfo {
            rdev: DeviceId::new(253, 0),
            rsector: 0,
            nr_sectors: 1,
            rw: Rw::Read,
        };

        let first = Hook::try_new(
            &pool,
            table.clone(),
            target.clone(),
            Rw::Read,
            Box::new(|_, _| {}),
            info,
        );
        assert!(first.is_ok());
        assert_eq!(pool.available(), 0);

        let second = Hook::try_new(&pool, table, target, Rw::Read, Box::new(|_, _| {}), info);
        assert!(second.is_err());

        drop(first);
        assert_eq!(pool.available(), 1);
    }
}
