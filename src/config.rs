//! Static tuning knobs, loaded from an optional YAML file the way the
//! teacher's binaries load their CLI-args-turned-config structs, falling
//! back to `Default`. None of this persists *device* state (still a
//! non-goal) — only the handful of constants spec §6 calls out.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HOOK_POOL_CAPACITY, DEFAULT_READ_AHEAD, GEOMETRY_HEADS, GEOMETRY_SECTORS, MAX_DEVICES,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmConfig {
    /// Size of the fixed-capacity device registry.
    pub max_devices: usize,
    /// Read-ahead, in sectors, assigned to a freshly activated device.
    pub default_read_ahead: u32,
    /// Synthetic geometry heads/sectors reported by the geometry ioctl.
    pub geometry_heads: u32,
    pub geometry_sectors: u32,
    /// Capacity of the I/O hook pool.
    pub hook_pool_capacity: usize,
    /// Executable spawned with `ACTION=add|remove DMNAME=<name>` on
    /// create/remove. `None` disables hotplug notification entirely.
    pub hotplug_helper: Option<String>,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            max_devices: MAX_DEVICES,
            default_read_ahead: DEFAULT_READ_AHEAD,
            geometry_heads: GEOMETRY_HEADS,
            geometry_sectors: GEOMETRY_SECTORS,
            hook_pool_capacity: DEFAULT_HOOK_POOL_CAPACITY,
            hotplug_helper: None,
        }
    }
}

impl DmConfig {
    /// Loads a config from a YAML file, falling back to defaults for any
    /// field the file omits. Missing file is not an error: returns
    /// `Default::default()`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, serde_yaml::Error> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_yaml::from_str(&contents),
            Err(_) => Ok(Self::default()),
        }
    }
}
