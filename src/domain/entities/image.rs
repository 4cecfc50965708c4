//! Cache key and loaded image types.

use std::sync::Arc;

/// Opaque identifier for a cacheable image, usually the source path or URL.
///
/// Lookups use the key as-is; the disk tier addresses records through
/// [`CacheKey::digest`]. Two distinct keys that happen to collide in the
/// digest space are treated as the same record by the disk tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the fixed-length, filesystem-safe record key for the disk
    /// tier: the first 16 bytes of the SHA-256 of the key, hex-encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&std::path::Path> for CacheKey {
    fn from(p: &std::path::Path) -> Self {
        Self::new(p.to_string_lossy().into_owned())
    }
}

/// Returns the number of raster bytes an image occupies in memory.
///
/// Used purely for eviction accounting in the memory tier.
#[must_use]
pub fn image_byte_size(image: &image::DynamicImage) -> u64 {
    image.as_bytes().len() as u64
}

/// Which tier a load was satisfied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory LRU tier.
    Memory,
    /// Served from the disk tier.
    Disk,
    /// Freshly decoded from the source path.
    Decoded,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Decoded => write!(f, "decoded"),
        }
    }
}

/// A decoded image together with the key it was requested under and the
/// tier that produced it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The key this image was requested under.
    pub key: CacheKey,
    /// The decoded raster.
    pub image: Arc<image::DynamicImage>,
    /// Where the image came from.
    pub source: ImageSource,
}
