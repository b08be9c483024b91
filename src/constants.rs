//! Crate-wide constants mirroring the tunables a real device-mapper build
//! would bake in at compile time.

/// Maximum number of concurrently registered devices.
pub const MAX_DEVICES: usize = 64;

/// Default read-ahead, in sectors, assigned to a freshly activated device.
pub const DEFAULT_READ_AHEAD: u32 = 64;

/// Synthetic geometry reported by the geometry ioctl.
pub const GEOMETRY_HEADS: u32 = 64;
pub const GEOMETRY_SECTORS: u32 = 32;

/// Sector size in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Fanout of the mapping table's implicit B-tree, tuned to fit a handful of
/// keys per cache line.
pub const KEYS_PER_NODE: usize = 15;

/// Major number this crate's devices are registered under.
pub const DM_MAJOR: u32 = 253;

/// Default capacity of the I/O hook pool.
pub const DEFAULT_HOOK_POOL_CAPACITY: usize = 4096;
