//! Ports for external collaborators.
//!
//! The platform image decoder and the display surface are black boxes to
//! this crate; both are expressed as traits implemented by the embedding
//! application.

mod decoder;
mod surface;

pub use decoder::ImageDecoder;
pub use surface::DisplaySurface;

#[cfg(test)]
pub use decoder::MockImageDecoder;
#[cfg(test)]
pub use surface::MockDisplaySurface;
