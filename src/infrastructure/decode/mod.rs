//! Downsampled decoding.
//!
//! Decodes produce an image close to, but not below, the requested display
//! size: a bounds-only probe yields the natural dimensions, the largest
//! power-of-two factor that keeps the halved dimensions above the requested
//! bounds is computed, and the real decode shrinks by that factor. This
//! bounds the decoded memory footprint at the price of this-run decode cost.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::domain::errors::DecodeError;
use crate::domain::ports::ImageDecoder;

/// Computes the power-of-two downsampling factor for a natural image size
/// decoded into `max_width` x `max_height` display bounds.
///
/// The factor starts at 1 and doubles while both halved natural dimensions
/// divided by it still exceed the requested bounds. An image that already
/// fits keeps factor 1.
#[must_use]
pub fn sample_factor(natural: (u32, u32), max_width: u32, max_height: u32) -> u32 {
    let (width, height) = natural;
    let mut factor = 1;
    if height > max_height || width > max_width {
        let half_width = width / 2;
        let half_height = height / 2;
        while half_height / factor > max_height && half_width / factor > max_width {
            factor *= 2;
        }
    }
    factor
}

/// Drives an [`ImageDecoder`] port through the probe -> factor -> decode
/// sequence. Blocking; the load pipeline runs it on a blocking worker.
pub struct BoundedDecoder {
    backend: Arc<dyn ImageDecoder>,
}

impl BoundedDecoder {
    /// Wraps a decoder backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ImageDecoder>) -> Self {
        Self { backend }
    }

    /// Decodes `path` into an image whose dimensions are close to, but not
    /// below, `max_width` x `max_height`.
    ///
    /// # Errors
    /// [`DecodeError`] when the source is missing or the decode fails.
    pub fn decode_within(
        &self,
        path: &Path,
        max_width: u32,
        max_height: u32,
    ) -> Result<image::DynamicImage, DecodeError> {
        let natural = self.backend.probe_bounds(path)?;
        let factor = sample_factor(natural, max_width, max_height);
        debug!(
            path = %path.display(),
            natural_width = natural.0,
            natural_height = natural.1,
            factor,
            "decoding with sample factor"
        );
        self.backend.decode(path, factor)
    }
}

impl Default for BoundedDecoder {
    fn default() -> Self {
        Self::new(Arc::new(ImageioDecoder))
    }
}

impl std::fmt::Debug for BoundedDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedDecoder").finish_non_exhaustive()
    }
}

/// Default [`ImageDecoder`] backend built on the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageioDecoder;

impl ImageDecoder for ImageioDecoder {
    fn probe_bounds(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
        if !path.exists() {
            return Err(DecodeError::NotFound(path.to_path_buf()));
        }
        let bounds =
            image::image_dimensions(path).map_err(|e| DecodeError::decode(path, e))?;
        trace!(path = %path.display(), width = bounds.0, height = bounds.1, "probed bounds");
        Ok(bounds)
    }

    fn decode(
        &self,
        path: &Path,
        sample_factor: u32,
    ) -> Result<image::DynamicImage, DecodeError> {
        if !path.exists() {
            return Err(DecodeError::NotFound(path.to_path_buf()));
        }
        let img = image::open(path).map_err(|e| DecodeError::decode(path, e))?;
        if sample_factor <= 1 {
            return Ok(img);
        }
        let width = (img.width() / sample_factor).max(1);
        let height = (img.height() / sample_factor).max(1);
        Ok(img.thumbnail_exact(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockImageDecoder;
    use test_case::test_case;

    #[test_case(1000, 800, 300, 300, 2 ; "spec scenario halved dims bound at two")]
    #[test_case(200, 100, 300, 300, 1 ; "already fits stays at one")]
    #[test_case(300, 300, 300, 300, 1 ; "exact fit stays at one")]
    #[test_case(301, 301, 300, 300, 1 ; "barely over but halved dims fit")]
    #[test_case(1200, 1200, 100, 100, 8 ; "halved dims shrink below bounds")]
    #[test_case(4096, 4096, 100, 100, 32 ; "deep downsampling")]
    #[test_case(4000, 100, 300, 300, 1 ; "one dimension fitting stops doubling")]
    fn test_sample_factor(w: u32, h: u32, max_w: u32, max_h: u32, expected: u32) {
        assert_eq!(sample_factor((w, h), max_w, max_h), expected);
    }

    #[test]
    fn test_sample_factor_zero_bounds_terminates() {
        let factor = sample_factor((1024, 1024), 0, 0);
        assert!(factor.is_power_of_two());
        assert!(factor >= 512);
    }

    #[test]
    fn test_probe_missing_path_is_not_found() {
        let err = ImageioDecoder
            .probe_bounds(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
    }

    #[test]
    fn test_decode_missing_path_is_not_found() {
        let err = ImageioDecoder
            .decode(Path::new("/definitely/not/here.png"), 1)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
    }

    #[test]
    fn test_probe_and_decode_real_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sample.png");
        image::DynamicImage::new_rgba8(64, 32).save(&path).unwrap();

        assert_eq!(ImageioDecoder.probe_bounds(&path).unwrap(), (64, 32));

        let full = ImageioDecoder.decode(&path, 1).unwrap();
        assert_eq!((full.width(), full.height()), (64, 32));

        let halved = ImageioDecoder.decode(&path, 2).unwrap();
        assert_eq!((halved.width(), halved.height()), (32, 16));
    }

    #[test]
    fn test_malformed_file_is_decode_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"this is not a png").unwrap();

        let err = ImageioDecoder.probe_bounds(&path).unwrap_err();
        assert!(matches!(err, DecodeError::Decode { .. }));
    }

    #[test]
    fn test_bounded_decoder_passes_computed_factor() {
        let mut backend = MockImageDecoder::new();
        backend
            .expect_probe_bounds()
            .returning(|_| Ok((1000, 800)));
        backend
            .expect_decode()
            .withf(|_, factor| *factor == 2)
            .returning(|_, _| Ok(image::DynamicImage::new_rgba8(500, 400)));

        let decoder = BoundedDecoder::new(Arc::new(backend));
        let img = decoder
            .decode_within(Path::new("whatever.png"), 300, 300)
            .unwrap();
        assert_eq!(img.width(), 500);
    }

    #[test]
    fn test_bounded_decoder_propagates_probe_failure() {
        let mut backend = MockImageDecoder::new();
        backend
            .expect_probe_bounds()
            .returning(|p| Err(DecodeError::NotFound(p.to_path_buf())));
        backend.expect_decode().never();

        let decoder = BoundedDecoder::new(Arc::new(backend));
        let err = decoder
            .decode_within(Path::new("gone.png"), 300, 300)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
    }
}
