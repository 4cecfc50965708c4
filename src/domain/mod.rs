//! Domain layer: entities, errors, and ports.

/// Core entities: cache keys, loaded images, load tasks.
pub mod entities;
/// Error types surfaced by the crate.
pub mod errors;
/// Port definitions for external collaborators.
pub mod ports;
