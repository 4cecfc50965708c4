//! Byte-bounded in-memory LRU image tier.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, image_byte_size};

/// In-memory LRU cache for decoded images, bounded by total raster bytes
/// rather than entry count.
///
/// Operations are synchronous and never touch disk. Both `get` hits and
/// `put` count as access for eviction ordering.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct Inner {
    entries: LruCache<CacheKey, Arc<image::DynamicImage>>,
    total_bytes: u64,
    capacity_bytes: u64,
}

impl MemoryStore {
    /// Creates a store bounded by `capacity_bytes` of decoded raster data.
    #[must_use]
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                capacity_bytes,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a decoded image, promoting the entry on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(img) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "memory cache miss");
            None
        }
    }

    /// Inserts an image if the key is absent. An existing entry is kept
    /// untouched apart from being promoted; the first writer wins.
    ///
    /// When the insertion pushes the running byte total over capacity,
    /// least-recently-used entries are evicted until the total fits again.
    pub fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if inner.entries.get(&key).is_some() {
            return;
        }

        let size = image_byte_size(&image);
        debug!(key = %key, size, "storing image in memory cache");
        inner.entries.push(key, image);
        inner.total_bytes += size;
        inner.evict_to_capacity();
    }

    /// Removes a single entry.
    pub fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        if let Some(img) = inner.entries.pop(key) {
            inner.total_bytes -= image_byte_size(&img);
            debug!(key = %key, "evicted image from memory cache");
        }
    }

    /// Evicts everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.entries.clear();
        inner.total_bytes = 0;
        debug!("cleared memory cache");
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entries
            .len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Running total of cached raster bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .total_bytes
    }

    /// Returns a statistics snapshot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> MemoryStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        MemoryStats {
            hits,
            misses,
            hit_rate,
            entries: self.len(),
            bytes: self.total_bytes(),
        }
    }
}

impl Inner {
    fn evict_to_capacity(&mut self) {
        while self.total_bytes > self.capacity_bytes {
            let Some((key, img)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes -= image_byte_size(&img);
            debug!(key = %key, "memory cache over capacity, evicted LRU entry");
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .field("bytes", &self.total_bytes())
            .finish_non_exhaustive()
    }
}

/// Statistics about memory tier performance.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub entries: usize,
    /// Current total of cached raster bytes.
    pub bytes: u64,
}

impl std::fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cache: {} images / {} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.entries, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}
