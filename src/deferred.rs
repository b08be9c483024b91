//! The deferred-I/O queue (spec §3 `DeferredItem`, §4.3, C4): a LIFO
//! singly-linked list per device, holding requests that arrived while the
//! device was not `ACTIVE`. Pushed under the registry writer lock; drained
//! by detaching the whole list under that same lock and replaying it
//! through the dispatcher outside the lock (spec §4.3, §4.6
//! `flush_deferred`).
//!
//! Replay order is explicitly not guaranteed stable — suspend is a rare
//! administrative event, and ordering across it is the upper layer's
//! problem when it matters (spec §4.3).

use crate::request::{Request, Rw};

pub(crate) struct DeferredItem {
    pub request: Request,
    pub rw: Rw,
    next: Option<Box<DeferredItem>>,
}

#[derive(Default)]
pub(crate) struct DeferredQueue {
    head: Option<Box<DeferredItem>>,
    len: usize,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub fn push(&mut self, request: Request, rw: Rw) {
        let node = Box::new(DeferredItem {
            request,
            rw,
            next: self.head.take(),
        });
        self.head = Some(node);
        self.len += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Detaches the entire list for replay, leaving the queue empty. Must
    /// be called under the registry writer lock; the caller replays the
    /// returned list outside the lock.
    pub fn take_all(&mut self) -> Option<Box<DeferredItem>> {
        self.len = 0;
        self.head.take()
    }
}

/// Consumes a detached list, invoking `f` for each item in LIFO
/// (most-recently-deferred-first) order.
pub(crate) fn replay(mut list: Option<Box<DeferredItem>>, mut f: impl FnMut(Request, Rw)) {
    while let Some(item) = list {
        f(item.request, item.rw);
        list = item.next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DeviceId;

    #[test]
    fn push_and_replay_lifo_order() {
        let mut q = DeferredQueue::new();
        for i in 0..3u64 {
            q.push(
                Request::new(DeviceId::new(253, 0), i, 1, Rw::Read, |_, _| {}),
                Rw::Read,
            );
        }
        assert_eq!(q.len(), 3);

        let list = q.take_all();
        assert!(q.is_empty());

        let mut seen = Vec::new();
        replay(list, |req, _rw| seen.push(req.rsector));
        assert_eq!(seen, vec![2, 1, 0]);
    }
}
