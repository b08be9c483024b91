//! The mapped device (spec §3 `MappedDevice`, §4.6, C5): owner of a table,
//! a deferred queue, an open-handle refcount and its own lifecycle state.
//!
//! Spec §9 flags the source's bitset-encoded `ACTIVE` bit as worth
//! redesigning; this is the tagged-variant replacement it recommends, which
//! also makes the brief `SUSPENDING` window (cleared `ACTIVE`, table still
//! bound, waiting for drain) an explicit, unambiguous state instead of an
//! implicit one readers have to infer from `map.is_some() && !ACTIVE`.

use std::sync::Arc;

use crate::{deferred::DeferredQueue, mapping::MappingTable, request::DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Allocated, never activated.
    Created,
    /// Serving I/O against `table`.
    Active,
    /// `activate`'s `ACTIVE` bit has been cleared and `suspend` is waiting
    /// for `table.pending` to drain; the table is still bound so in-flight
    /// completions can still find it.
    Suspending,
    /// Drained; table has been unbound.
    Suspended,
    /// Unregistered; the registry slot has been freed. A `MappedDevice` in
    /// this state is never observable through the registry again — it
    /// exists only transiently in the caller that triggered `remove`.
    Removed,
}

pub struct MappedDevice {
    id: DeviceId,
    name: String,
    state: DeviceState,
    table: Option<Arc<MappingTable>>,
    pub(crate) deferred: DeferredQueue,
    use_count: u32,
    read_ahead: u32,
}

impl MappedDevice {
    pub(crate) fn new(id: DeviceId, name: String, read_ahead: u32) -> Self {
        Self {
            id,
            name,
            state: DeviceState::Created,
            table: None,
            deferred: DeferredQueue::new(),
            use_count: 0,
            read_ahead,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// The currently bound table, if any. `Some` while `Active` or while
    /// `Suspending` (in-flight I/O from the old table may still complete).
    pub fn table(&self) -> Option<&Arc<MappingTable>> {
        self.table.as_ref()
    }

    pub(crate) fn set_state(&mut self, state: DeviceState) {
        self.state = state;
    }

    pub(crate) fn bind_table(&mut self, table: Arc<MappingTable>) {
        self.table = Some(table);
    }

    pub(crate) fn clear_table(&mut self) {
        self.table = None;
    }

    pub(crate) fn open(&mut self) {
        self.use_count += 1;
    }

    pub(crate) fn close(&mut self) {
        self.use_count = self.use_count.saturating_sub(1);
    }

    pub fn read_ahead(&self) -> u32 {
        self.read_ahead
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub(crate) fn set_read_ahead(&mut self, value: u32) {
        self.read_ahead = value;
    }
}
