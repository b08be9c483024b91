//! The handle a `Target::err` implementation receives for a failed
//! completion it chooses to handle (spec §4.5 step 2). Ownership of
//! finishing the request — decrementing the owning table's `pending` and
//! invoking the upper layer's original `end_io` — travels with this value:
//! either the trampoline finishes it immediately (the target declined), or
//! the target stashes it and finishes it later, exactly once, from
//! wherever its own retry/recovery logic completes.

use std::sync::Arc;

use crate::{
    mapping::MappingTable,
    request::{EndIo, RequestInfo},
};

pub struct DeferredCompletion {
    table: Arc<MappingTable>,
    end_io: Option<EndIo>,
    info: RequestInfo,
}

impl DeferredCompletion {
    pub(crate) fn new(table: Arc<MappingTable>, end_io: EndIo, info: RequestInfo) -> Self {
        Self {
            table,
            end_io: Some(end_io),
            info,
        }
    }

    /// The (immutable) request metadata this completion belongs to.
    pub fn info(&self) -> RequestInfo {
        self.info
    }

    /// Decrements the owning table's `pending` and invokes the original
    /// `end_io` with `uptodate`. Consumes `self`, enforcing "exactly once"
    /// at the type level.
    pub fn finish(mut self, uptodate: bool) {
        self.table.dec_pending();
        if let Some(end_io) = self.end_io.take() {
            end_io(self.info, uptodate);
        }
    }
}
