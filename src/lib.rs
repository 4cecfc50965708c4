//! Rastercache - a two-tier decoded image cache.
//!
//! This crate keeps expensive-to-decode raster images available for display
//! through a bounded in-memory tier backed by a persistent disk tier, and
//! drives asynchronous load pipelines that never install a stale result into
//! a display surface that has moved on to a different request.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the cache tiers, decoder, and loader.
pub mod infrastructure;

pub use domain::entities::{CacheKey, ImageSource, LoadTask, LoadedImage, TaskHandle, TaskState};
pub use domain::errors::{ConfigError, DecodeError};
pub use domain::ports::{DisplaySurface, ImageDecoder};
pub use infrastructure::cache::{CacheManager, MemoryStats, MemoryStore};
pub use infrastructure::config::CacheConfig;
pub use infrastructure::decode::{BoundedDecoder, ImageioDecoder, sample_factor};
pub use infrastructure::loader::LoadCoordinator;

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = "rastercache";
