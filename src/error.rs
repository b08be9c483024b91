//! Error taxonomy for the mapper, modeled after `io-engine`'s `CoreError`:
//! one `snafu` enum, each variant carrying the POSIX errno a caller at the
//! block-layer boundary would surface (spec §6, §7).

use nix::errno::Errno;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DmError {
    /// Minor number is out of range or the slot is empty.
    #[snafu(display("no such device: minor {minor}"))]
    NoSuchDevice { minor: u32 },

    /// Device exists but has no bound mapping table (never activated, or
    /// torn down mid-deactivate).
    #[snafu(display("device '{name}' has no bound mapping table"))]
    NoMappingTable { name: String },

    /// Hook pool exhausted; the affected request must fail, the device is
    /// left untouched.
    #[snafu(display("I/O hook pool exhausted ({capacity} hooks outstanding)"))]
    AllocFailure { capacity: usize },

    /// The deferred queue could not hold another item (allocation failure
    /// on the rare, heap-backed path).
    #[snafu(display("failed to allocate a deferred I/O entry"))]
    DeferredQueueAllocFailed,

    /// A target's `map` returned a synchronous error.
    #[snafu(display("target '{target}' failed to map request: {source}"))]
    TargetMapError { target: String, source: Errno },

    /// A forwarded request completed with an error the target's `err` hook
    /// declined to handle.
    #[snafu(display("request to '{target}' completed with an error"))]
    TargetCompletionError { target: String },

    /// `remove`/`deactivate` attempted while the device is open or active.
    #[snafu(display("device '{name}' is busy"))]
    Busy { name: String },

    /// Bad administrative input: empty table on activate, unsupported
    /// ioctl, a minor already occupied by `create(minor=k)`.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    /// Device already exists at the requested minor.
    #[snafu(display("minor {minor} is already in use"))]
    MinorInUse { minor: u32 },

    /// Registry has no free slots.
    #[snafu(display("device registry is full ({max} slots)"))]
    RegistryFull { max: usize },
}

impl DmError {
    /// Maps a variant to the POSIX errno a block-layer caller expects, per
    /// spec §6's "Exit codes/errors" table.
    pub fn errno(&self) -> Errno {
        match self {
            DmError::NoSuchDevice { .. } => Errno::ENODEV,
            DmError::NoMappingTable { .. } => Errno::ENXIO,
            DmError::AllocFailure { .. } => Errno::ENOMEM,
            DmError::DeferredQueueAllocFailed => Errno::ENOMEM,
            DmError::TargetMapError { source, .. } => *source,
            DmError::TargetCompletionError { .. } => Errno::EIO,
            DmError::Busy { .. } => Errno::EBUSY,
            DmError::InvalidArgument { .. } => Errno::EINVAL,
            DmError::MinorInUse { .. } => Errno::EBUSY,
            DmError::RegistryFull { .. } => Errno::ENOMEM,
        }
    }
}

pub type DmResult<T> = Result<T, DmError>;
