//! The request structure threaded through the dispatcher and completion
//! path (spec §3 "IOHook", §9 "Completion hook chaining without
//! inheritance").
//!
//! The kernel original swaps a pair of raw fields (`bi_end_io` function
//! pointer, `bi_private` context pointer) on the request and restores them
//! on completion. A boxed closure plays both roles here: it already closes
//! over whatever context the upper layer needs, so there is no separate
//! context pointer to thread through — `end_io` is captured exactly once,
//! swapped out by the dispatcher when a request is forwarded, and restored
//! by the completion trampoline (`crate::dispatch::dec_pending`) before the
//! original is invoked.

use std::fmt;

/// A device id: (major, minor), mirroring the kernel's packed dev_t.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Read/write direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rw {
    Read,
    Write,
}

/// The immutable parts of a request, handed to `end_io` at completion time
/// instead of the request itself (the request is consumed by the time its
/// own closure runs — see module docs).
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo {
    pub rdev: DeviceId,
    pub rsector: u64,
    pub nr_sectors: u64,
    pub rw: Rw,
}

pub(crate) type EndIo = Box<dyn FnOnce(RequestInfo, bool) + Send>;

/// An in-flight I/O request. Targets mutate `rdev`/`rsector` on forward
/// (spec §4.1 "Target"); the dispatcher consumes `end_io` to install its
/// completion hook and restores it before the original runs.
pub struct Request {
    pub rdev: DeviceId,
    pub rsector: u64,
    pub nr_sectors: u64,
    rw: Rw,
    end_io: Option<EndIo>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request {{ rdev: {}, rsector: {}, nr_sectors: {}, rw: {:?} }}",
            self.rdev, self.rsector, self.nr_sectors, self.rw
        )
    }
}

impl Request {
    pub fn new(
        rdev: DeviceId,
        rsector: u64,
        nr_sectors: u64,
        rw: Rw,
        end_io: impl FnOnce(RequestInfo, bool) + Send + 'static,
    ) -> Self {
        Self {
            rdev,
            rsector,
            nr_sectors,
            rw,
            end_io: Some(Box::new(end_io)),
        }
    }

    pub fn rw(&self) -> Rw {
        self.rw
    }

    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            rdev: self.rdev,
            rsector: self.rsector,
            nr_sectors: self.nr_sectors,
            rw: self.rw,
        }
    }

    /// Takes the current completion closure, leaving the request with none.
    /// Used by the dispatcher to save the upper layer's `end_io` before
    /// installing the hook's trampoline.
    pub(crate) fn take_end_io(&mut self) -> Option<EndIo> {
        self.end_io.take()
    }

    /// Installs a new completion closure, discarding any previous one. Used
    /// by the dispatcher to install the hook's trampoline, and by the
    /// trampoline to restore the saved original.
    pub(crate) fn set_end_io(&mut self, end_io: EndIo) {
        self.end_io = Some(end_io);
    }

    /// Consumes the request and invokes whatever `end_io` is currently
    /// installed, exactly once. Called by the lower-layer `submit`
    /// collaborator (out of scope) when the forwarded I/O completes, or by
    /// the dispatcher itself for a synchronously satisfied request.
    pub fn complete(mut self, uptodate: bool) {
        if let Some(end_io) = self.end_io.take() {
            end_io(self.info(), uptodate);
        }
    }
}
