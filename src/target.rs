//! The target plugin contract (spec §4.1, C1). Consumed, not owned: the
//! loader that instantiates targets from control-plane table descriptions is
//! out of scope, but the trait it builds against lives here.

use bitflags::bitflags;
use nix::errno::Errno;

use crate::{
    completion::DeferredCompletion,
    request::{Request, RequestInfo, Rw},
};

bitflags! {
    /// Capability flags a `Target` advertises (spec §3 `TargetType`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TargetFlags: u32 {
        /// Target can answer the `bmap` boundary helper (spec §4.8).
        const SUPPORTS_BMAP = 1 << 0;
    }
}

/// Outcome of `Target::map`, corresponding to the kernel's `>0 / 0 / <0`
/// return-value encoding (spec §4.1, §4.4 step 5).
#[derive(Debug)]
pub enum MapResult {
    /// Request was redirected; forward it to the lower layer.
    Forwarded,
    /// Request is already satisfied; do not forward.
    CompletedSync,
    /// Synchronous failure; fail the request with the given errno.
    Error(Errno),
}

/// A pluggable remapper bound to a sector interval of a mapping table
/// (spec §3 `Target`, §4.1 `TargetType`).
///
/// Implementations must not block: `map` runs on the dispatcher's hot path,
/// which may be a context that cannot sleep (spec §5).
pub trait Target: Send + Sync {
    /// Short name, used in log lines and error messages.
    fn name(&self) -> &str;

    /// Capability flags this target advertises.
    fn flags(&self) -> TargetFlags {
        TargetFlags::empty()
    }

    /// Inspects and may mutate `req.rdev`/`req.rsector` to redirect the
    /// request. Called with the request's direction so the target can
    /// refuse writes to a read-only remap, for instance.
    fn map(&self, req: &mut Request, rw: Rw) -> MapResult;

    /// Called on a failed completion for a request this target forwarded.
    /// Returning `Ok(())` takes ownership of `completion`: the target must
    /// arrange to call `completion.finish(..)` itself, eventually — the
    /// trampoline will neither decrement `pending` nor invoke the original
    /// `end_io` in the meantime. Returning `Err(completion)` hands it back
    /// unfinished for the trampoline to complete immediately with the
    /// default `!uptodate` outcome. The default declines to handle
    /// anything.
    fn err(
        &self,
        _info: &RequestInfo,
        _rw: Rw,
        completion: DeferredCompletion,
    ) -> Result<(), DeferredCompletion> {
        Err(completion)
    }
}
