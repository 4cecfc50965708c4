//! Asynchronous load coordination.
//!
//! One decode/load attempt runs per surface binding; an outdated attempt
//! never mutates a surface that has moved on to a different request. The
//! guarantee rests on two checks at completion time: the task must not be
//! cancelled, and the surface must still be bound to this exact task.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tokio::sync::Semaphore;
use tracing::{debug, error, trace};

use crate::domain::entities::{CacheKey, ImageSource, LoadTask, LoadedImage, TaskHandle};
use crate::domain::ports::DisplaySurface;
use crate::infrastructure::cache::CacheManager;
use crate::infrastructure::decode::BoundedDecoder;

/// Default bound on concurrently executing load pipelines.
pub const DEFAULT_MAX_CONCURRENT_LOADS: usize = 4;

/// Schedules load tasks per display surface.
///
/// The caller of [`request_load`] never blocks: tier lookups, decoding, and
/// the final install all happen on spawned tasks. Cancellation is
/// cooperative; lookups already in flight are allowed to finish, only the
/// final surface mutation is suppressed.
///
/// [`request_load`]: LoadCoordinator::request_load
pub struct LoadCoordinator {
    cache: Arc<CacheManager>,
    decoder: Arc<BoundedDecoder>,
    semaphore: Arc<Semaphore>,
}

impl LoadCoordinator {
    /// Creates a coordinator over a shared cache with the default decoder
    /// backend and concurrency bound.
    #[must_use]
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self::with_decoder(cache, BoundedDecoder::default(), DEFAULT_MAX_CONCURRENT_LOADS)
    }

    /// Creates a coordinator with an explicit decoder and concurrency bound.
    #[must_use]
    pub fn with_decoder(
        cache: Arc<CacheManager>,
        decoder: BoundedDecoder,
        max_concurrent_loads: usize,
    ) -> Self {
        Self {
            cache,
            decoder: Arc::new(decoder),
            semaphore: Arc::new(Semaphore::new(max_concurrent_loads.max(1))),
        }
    }

    /// Requests an image for `surface`, decoded from the source named by
    /// `key` to fit `max_width` x `max_height`.
    ///
    /// A bound task still in flight for the same key coalesces the request
    /// (no duplicate work, returns `None`). A bound task for a different
    /// key is cancelled. Otherwise a new task is bound to the surface --
    /// visible to the surface before the pipeline starts -- and spawned.
    ///
    /// Requires a tokio runtime context.
    pub fn request_load<S>(
        &self,
        surface: &Arc<S>,
        key: impl Into<CacheKey>,
        max_width: u32,
        max_height: u32,
    ) -> Option<TaskHandle>
    where
        S: DisplaySurface + 'static,
    {
        let key = key.into();

        if let Some(current) = surface.bound_task()
            && !current.is_finished()
        {
            if current.key() == &key {
                trace!(key = %key, "load already in flight, coalescing");
                return None;
            }
            trace!(
                key = %key,
                superseded = %current.key(),
                "superseding in-flight load"
            );
            current.cancel();
        }

        let task: TaskHandle = Arc::new(LoadTask::new(key, max_width, max_height));
        surface.bind_task(Some(task.clone()));
        surface.show_placeholder();

        let pipeline = Pipeline {
            cache: self.cache.clone(),
            decoder: self.decoder.clone(),
            semaphore: self.semaphore.clone(),
        };
        let weak_surface = Arc::downgrade(surface);
        let spawned = task.clone();
        tokio::spawn(async move {
            pipeline.run(weak_surface, spawned).await;
        });

        Some(task)
    }
}

impl std::fmt::Debug for LoadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadCoordinator").finish_non_exhaustive()
    }
}

struct Pipeline {
    cache: Arc<CacheManager>,
    decoder: Arc<BoundedDecoder>,
    semaphore: Arc<Semaphore>,
}

impl Pipeline {
    async fn run<S>(&self, surface: Weak<S>, task: TaskHandle)
    where
        S: DisplaySurface + 'static,
    {
        let Ok(_permit) = self.semaphore.clone().acquire_owned().await else {
            return;
        };
        task.mark_running();

        let image = self.resolve(&task).await;

        if !task.try_complete() {
            trace!(task = task.id(), key = %task.key(), "task cancelled, result discarded");
            return;
        }
        let Some(surface) = surface.upgrade() else {
            trace!(task = task.id(), "surface destroyed before completion");
            return;
        };
        let still_bound = surface
            .bound_task()
            .is_some_and(|bound| Arc::ptr_eq(&bound, &task));
        if !still_bound {
            trace!(task = task.id(), key = %task.key(), "surface rebound, result discarded");
            return;
        }

        if let Some(loaded) = image {
            debug!(
                task = task.id(),
                key = %loaded.key,
                source = %loaded.source,
                "installing loaded image"
            );
            surface.show_image(loaded.image);
        } else {
            // Missing source or failed decode: the placeholder stays up and
            // the caller may re-request.
            debug!(task = task.id(), key = %task.key(), "load produced no image");
        }
    }

    /// Memory -> disk -> decode, with cancellation checkpoints between the
    /// stages. A disk hit is promoted into the memory tier; a fresh decode
    /// populates both tiers.
    async fn resolve(&self, task: &TaskHandle) -> Option<LoadedImage> {
        let key = task.key().clone();

        if let Some(image) = self.cache.get_from_memory(&key) {
            return Some(LoadedImage {
                key,
                image,
                source: ImageSource::Memory,
            });
        }
        if task.is_cancelled() {
            return None;
        }

        if let Some(image) = self.cache.get_from_disk(&key).await {
            self.cache.put_memory(&key, &image);
            return Some(LoadedImage {
                key,
                image,
                source: ImageSource::Disk,
            });
        }
        if task.is_cancelled() {
            return None;
        }

        let decoder = self.decoder.clone();
        let path = PathBuf::from(key.as_str());
        let (max_width, max_height) = (task.max_width(), task.max_height());
        let decoded =
            tokio::task::spawn_blocking(move || decoder.decode_within(&path, max_width, max_height))
                .await;

        match decoded {
            Ok(Ok(image)) => {
                let image = Arc::new(image);
                self.cache.put_both(&key, &image);
                Some(LoadedImage {
                    key,
                    image,
                    source: ImageSource::Decoded,
                })
            }
            Ok(Err(e)) => {
                debug!(key = %key, error = %e, "decode yielded no image");
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "decode task panicked");
                None
            }
        }
    }
}
