//! Cache configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

/// Default fraction of system memory granted to the memory tier.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.15;

/// Default disk tier capacity in bytes (10 MiB).
pub const DEFAULT_DISK_CAPACITY: u64 = 10 * 1024 * 1024;

/// Directory name used by [`CacheConfig::default_disk_dir`].
const DEFAULT_DISK_DIR_NAME: &str = "images";

const MIN_MEMORY_FRACTION: f64 = 0.05;
const MAX_MEMORY_FRACTION: f64 = 0.8;

/// Configuration for a [`CacheManager`](crate::CacheManager).
///
/// Validated once at construction; an out-of-range value is a
/// [`ConfigError`], not a clamped default.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fraction of total system memory granted to the memory tier.
    /// Valid range is `[0.05, 0.8]`.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f64,

    /// Explicit memory budget in bytes. When set, `memory_fraction` applies
    /// to this figure instead of the memory reported by the system.
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,

    /// Disk tier capacity in bytes.
    #[serde(default = "default_disk_capacity")]
    pub disk_capacity: u64,

    /// Directory holding the disk tier. Required when the disk tier is
    /// enabled.
    #[serde(default)]
    pub disk_dir: Option<PathBuf>,

    /// Enables the memory tier.
    #[serde(default = "default_true")]
    pub memory_enabled: bool,

    /// Enables the disk tier.
    #[serde(default = "default_true")]
    pub disk_enabled: bool,

    /// Deletes any persisted disk records during the first initialization.
    #[serde(default)]
    pub clear_disk_on_start: bool,

    /// Starts disk initialization at construction instead of on first use.
    #[serde(default = "default_true")]
    pub eager_disk_init: bool,
}

fn default_memory_fraction() -> f64 {
    DEFAULT_MEMORY_FRACTION
}

const fn default_disk_capacity() -> u64 {
    DEFAULT_DISK_CAPACITY
}

const fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_fraction: DEFAULT_MEMORY_FRACTION,
            memory_budget_bytes: None,
            disk_capacity: DEFAULT_DISK_CAPACITY,
            disk_dir: None,
            memory_enabled: true,
            disk_enabled: true,
            clear_disk_on_start: false,
            eager_disk_init: true,
        }
    }
}

impl CacheConfig {
    /// Checks the configuration for construction.
    ///
    /// # Errors
    /// [`ConfigError`] when the memory fraction is out of range, the disk
    /// capacity is zero, or the disk tier is enabled without a directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MEMORY_FRACTION..=MAX_MEMORY_FRACTION).contains(&self.memory_fraction) {
            return Err(ConfigError::MemoryFractionOutOfRange {
                fraction: self.memory_fraction,
            });
        }
        if self.disk_enabled {
            if self.disk_capacity == 0 {
                return Err(ConfigError::ZeroDiskCapacity);
            }
            if self.disk_dir.is_none() {
                return Err(ConfigError::MissingDiskDir);
            }
        }
        Ok(())
    }

    /// Sets the memory fraction. Validated later by [`CacheConfig::validate`].
    #[must_use]
    pub const fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    /// Sets an explicit memory budget in bytes.
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Sets the disk capacity in bytes.
    #[must_use]
    pub const fn with_disk_capacity(mut self, bytes: u64) -> Self {
        self.disk_capacity = bytes;
        self
    }

    /// Sets the disk cache directory.
    #[must_use]
    pub fn with_disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    /// Computes the memory tier capacity in bytes: the configured fraction
    /// of either the explicit budget or the total memory reported by the
    /// system.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn memory_capacity_bytes(&self) -> u64 {
        let budget = self.memory_budget_bytes.unwrap_or_else(total_system_memory);
        (self.memory_fraction * budget as f64).round() as u64
    }

    /// Resolves the platform cache directory for this crate
    /// (`<cache>/rastercache/images`), falling back to the system temp
    /// directory when no home is available.
    #[must_use]
    pub fn default_disk_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "linuxmobile", crate::NAME).map_or_else(
            || {
                std::env::temp_dir()
                    .join(crate::NAME)
                    .join(DEFAULT_DISK_DIR_NAME)
            },
            |dirs| dirs.cache_dir().join(DEFAULT_DISK_DIR_NAME),
        )
    }
}

fn total_system_memory() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.total_memory()
}
