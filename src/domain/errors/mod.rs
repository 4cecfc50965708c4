//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid construction parameters. Raised synchronously and fatally when a
/// cache is built; never produced by steady-state operation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Memory fraction outside the accepted `[0.05, 0.8]` range.
    #[error("memory fraction must be between 0.05 and 0.8 (inclusive), got {fraction}")]
    MemoryFractionOutOfRange {
        /// The rejected value.
        fraction: f64,
    },

    /// Disk capacity of zero makes the tier unusable.
    #[error("disk capacity must be greater than zero")]
    ZeroDiskCapacity,

    /// Disk tier enabled without a directory to store it in.
    #[error("disk cache enabled but no cache directory configured")]
    MissingDiskDir,
}

/// Failure to produce a decoded image for a source path.
///
/// Recovered locally by the load pipeline: the load yields no image and the
/// surface keeps showing its placeholder.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The source path does not exist or its bounds cannot be read.
    #[error("source not found: {0}")]
    NotFound(PathBuf),

    /// The underlying decode call failed.
    #[error("decode failed for {path}: {message}")]
    Decode {
        /// The source path.
        path: PathBuf,
        /// Backend error description.
        message: String,
    },
}

impl DecodeError {
    /// Creates a decode failure from a backend error.
    #[must_use]
    pub fn decode(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Disk-tier failure. Internal: open failures disable the tier, later I/O
/// failures are logged and treated as a miss; neither reaches callers.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// The backing directory does not have enough usable free space.
    #[error("insufficient free space in {dir}: {available} bytes available, capacity {capacity}")]
    InsufficientSpace {
        /// The cache directory.
        dir: PathBuf,
        /// Usable free space reported for the directory's mount.
        available: u64,
        /// Configured capacity the space must exceed.
        capacity: u64,
    },

    /// Filesystem error.
    #[error("cache store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
