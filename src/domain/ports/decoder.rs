//! Port definition for the platform image decoder.

use std::path::Path;

use crate::domain::errors::DecodeError;

/// Decodes images from source paths.
///
/// Both operations are blocking and are always driven from a blocking
/// execution context by the load pipeline. Implementations must be
/// thread-safe.
#[cfg_attr(test, mockall::automock)]
pub trait ImageDecoder: Send + Sync {
    /// Reads the natural pixel dimensions of the source without
    /// materializing the raster.
    ///
    /// # Errors
    /// [`DecodeError::NotFound`] when the path does not exist or its header
    /// cannot be read.
    fn probe_bounds(&self, path: &Path) -> Result<(u32, u32), DecodeError>;

    /// Decodes the source, downsampling each dimension by `sample_factor`
    /// (a power of two; `1` means no downsampling).
    ///
    /// # Errors
    /// [`DecodeError`] when the source is unreadable or malformed.
    fn decode(&self, path: &Path, sample_factor: u32)
    -> Result<image::DynamicImage, DecodeError>;
}
