//! Infrastructure layer: cache tiers, decoding, and load orchestration.

/// Cache tiers and the manager composing them.
pub mod cache;
/// Cache configuration.
pub mod config;
/// Downsampled decoding.
pub mod decode;
/// Asynchronous load coordination.
pub mod loader;
