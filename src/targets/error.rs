//! Error-injecting target: fails `map` synchronously when configured to,
//! and otherwise forwards transparently while optionally claiming
//! ownership of failed completions to exercise the `err` hook (spec §8 S4,
//! S5).

use parking_lot::Mutex;

use crate::{
    completion::DeferredCompletion,
    request::{Request, RequestInfo, Rw},
    target::{MapResult, Target, TargetFlags},
};

pub struct ErrorTarget {
    name: String,
    fail_map: nix::errno::Errno,
    should_fail_map: bool,
    handle_completion_errors: bool,
    stashed: Mutex<Option<DeferredCompletion>>,
}

impl ErrorTarget {
    /// A target that fails every `map` call with `errno` (spec §8 S4).
    pub fn failing(name: impl Into<String>, errno: nix::errno::Errno) -> Self {
        Self {
            name: name.into(),
            fail_map: errno,
            should_fail_map: true,
            handle_completion_errors: false,
            stashed: Mutex::new(None),
        }
    }

    /// A target that forwards transparently but claims ownership of failed
    /// completions (spec §8 S5), to be finished later via
    /// `complete_stashed`.
    pub fn handling_completions(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_map: nix::errno::Errno::EIO,
            should_fail_map: false,
            handle_completion_errors: true,
            stashed: Mutex::new(None),
        }
    }

    /// Finishes a completion this target previously claimed ownership of.
    /// Panics if none is stashed — a test-only convenience, not a retry
    /// loop.
    pub fn complete_stashed(&self, uptodate: bool) {
        let completion = self
            .stashed
            .lock()
            .take()
            .expect("no completion stashed to finish");
        completion.finish(uptodate);
    }

    pub fn has_stashed_completion(&self) -> bool {
        self.stashed.lock().is_some()
    }
}

impl Target for ErrorTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> TargetFlags {
        TargetFlags::empty()
    }

    fn map(&self, _req: &mut Request, _rw: Rw) -> MapResult {
        if self.should_fail_map {
            MapResult::Error(self.fail_map)
        } else {
            MapResult::Forwarded
        }
    }

    fn err(
        &self,
        _info: &RequestInfo,
        _rw: Rw,
        completion: DeferredCompletion,
    ) -> Result<(), DeferredCompletion> {
        if self.handle_completion_errors {
            *self.stashed.lock() = Some(completion);
            Ok(())
        } else {
            Err(completion)
        }
    }
}
