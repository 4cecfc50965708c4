//! Two-tier cache facade.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::ConfigError;
use crate::infrastructure::cache::{DiskStore, MemoryStore};
use crate::infrastructure::config::CacheConfig;

use super::memory_store::MemoryStats;

/// Single entry point composing the memory and disk tiers.
///
/// Owns a one-shot, background disk initialization: the disk tier reports
/// "initializing" from construction until the open attempt finishes, and any
/// disk read or write issued before that point waits on a condition variable
/// until it does. Memory-tier operations are synchronous and never wait.
///
/// Disk I/O errors after a successful open are logged and swallowed; the
/// memory tier and the re-decode path remain the source of truth. Only an
/// open failure disables the disk tier for the lifetime of this manager.
///
/// Construct once and share via `Arc`; asynchronous operations require a
/// tokio runtime.
#[derive(Debug)]
pub struct CacheManager {
    memory: Option<MemoryStore>,
    disk: Arc<DiskTier>,
}

#[derive(Debug)]
struct DiskTier {
    enabled: bool,
    dir: PathBuf,
    capacity: u64,
    clear_on_first_init: AtomicBool,
    state: Mutex<TierState>,
    cond: Condvar,
}

#[derive(Debug)]
struct TierState {
    /// True while an open attempt is pending; readers wait on the condvar.
    initializing: bool,
    /// Ensures the initial open is spawned at most once.
    init_started: bool,
    /// Set on open failure; the tier stays absent for this manager.
    open_failed: bool,
    /// Set by shutdown; all subsequent operations are no-ops.
    closed: bool,
    store: Option<DiskStore>,
}

impl CacheManager {
    /// Builds a manager from a validated configuration.
    ///
    /// With `eager_disk_init` the disk open starts immediately on a blocking
    /// worker (requires a tokio runtime context); otherwise the first disk
    /// operation triggers it.
    ///
    /// # Errors
    /// [`ConfigError`] when the configuration is invalid.
    pub fn new(config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let memory = config
            .memory_enabled
            .then(|| MemoryStore::new(config.memory_capacity_bytes()));

        let disk = Arc::new(DiskTier {
            enabled: config.disk_enabled,
            dir: config.disk_dir.clone().unwrap_or_default(),
            capacity: config.disk_capacity,
            clear_on_first_init: AtomicBool::new(config.clear_disk_on_start),
            state: Mutex::new(TierState {
                initializing: config.disk_enabled,
                init_started: false,
                open_failed: false,
                closed: false,
                store: None,
            }),
            cond: Condvar::new(),
        });

        let manager = Self { memory, disk };
        if config.disk_enabled && config.eager_disk_init {
            manager.ensure_disk_init();
        }
        Ok(manager)
    }

    /// Looks up the memory tier. Synchronous, never blocks on disk state.
    pub fn get_from_memory(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        self.memory.as_ref()?.get(key)
    }

    /// Inserts into the memory tier only (no-op when the key is present or
    /// the tier is disabled).
    pub fn put_memory(&self, key: &CacheKey, image: &Arc<image::DynamicImage>) {
        if let Some(memory) = &self.memory {
            memory.put(key.clone(), image.clone());
        }
    }

    /// Looks up the disk tier.
    ///
    /// The blocking worker waits until disk initialization completes, then
    /// reads and decodes the stored blob. Returns `None` for a miss, a
    /// disabled tier, or any swallowed I/O or decode failure.
    pub async fn get_from_disk(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        if !self.disk.enabled {
            return None;
        }
        self.ensure_disk_init();

        let tier = self.disk.clone();
        let key = key.clone();
        let result = tokio::task::spawn_blocking(move || {
            let bytes = tier.get_blocking(&key.digest())?;
            match image::load_from_memory(&bytes) {
                Ok(img) => {
                    debug!(key = %key, "decoded image from disk cache");
                    Some(Arc::new(img))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to decode cached blob");
                    None
                }
            }
        })
        .await;

        match result {
            Ok(hit) => hit,
            Err(e) => {
                error!(error = %e, "disk read task panicked");
                None
            }
        }
    }

    /// Inserts into both tiers: the memory write is synchronous and visible
    /// immediately, the disk write (PNG encode + journaled blob put) is
    /// scheduled on a blocking worker without delaying the caller.
    pub fn put_both(&self, key: &CacheKey, image: &Arc<image::DynamicImage>) {
        self.put_memory(key, image);

        if !self.disk.enabled {
            return;
        }
        self.ensure_disk_init();

        let tier = self.disk.clone();
        let key = key.clone();
        let image = image.clone();
        tokio::task::spawn_blocking(move || {
            let digest = key.digest();
            if tier.contains_blocking(&digest) {
                return;
            }
            let mut blob = Vec::new();
            let encoded = image.write_to(
                &mut std::io::Cursor::new(&mut blob),
                image::ImageFormat::Png,
            );
            if let Err(e) = encoded {
                warn!(key = %key, error = %e, "failed to encode image for disk cache");
                return;
            }
            tier.put_blocking(&digest, &blob);
        });
    }

    /// Evicts a single key from both tiers. The memory eviction is
    /// immediate; the disk record is removed on a blocking worker.
    pub fn remove(&self, key: &CacheKey) {
        if let Some(memory) = &self.memory {
            memory.remove(key);
        }
        if !self.disk.enabled {
            return;
        }
        self.ensure_disk_init();

        let tier = self.disk.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || tier.remove_blocking(&key.digest()));
    }

    /// Evicts the memory tier immediately and schedules deletion plus
    /// re-initialization of the disk tier; the disk tier reports
    /// "initializing" again until the reopen finishes.
    pub fn clear(&self) {
        if let Some(memory) = &self.memory {
            memory.clear();
        }
        if !self.disk.enabled {
            return;
        }
        self.ensure_disk_init();

        let tier = self.disk.clone();
        tokio::task::spawn_blocking(move || tier.clear_blocking());
    }

    /// Flushes pending disk-tier journal writes.
    pub async fn flush(&self) {
        if !self.disk.enabled {
            return;
        }
        let tier = self.disk.clone();
        let _ = tokio::task::spawn_blocking(move || tier.flush_blocking()).await;
    }

    /// Closes the disk tier. Idempotent, safe when the tier never opened,
    /// and wakes any task still waiting on initialization.
    pub async fn shutdown(&self) {
        let tier = self.disk.clone();
        let _ = tokio::task::spawn_blocking(move || tier.shutdown_blocking()).await;
    }

    /// Memory tier statistics, when the tier is enabled.
    #[must_use]
    pub fn memory_stats(&self) -> Option<MemoryStats> {
        self.memory.as_ref().map(MemoryStore::stats)
    }

    /// Spawns the one-shot disk open if it has not started yet.
    fn ensure_disk_init(&self) {
        let mut state = self.disk.lock_state();
        if !self.disk.enabled || state.closed || state.init_started {
            return;
        }
        state.init_started = true;
        drop(state);

        let tier = self.disk.clone();
        tokio::task::spawn_blocking(move || tier.initialize());
    }
}

impl DiskTier {
    fn lock_state(&self) -> MutexGuard<'_, TierState> {
        self.state.lock().expect("disk tier lock poisoned")
    }

    /// Opens the store under the tier lock and clears the initializing
    /// flag, waking every waiter exactly once.
    fn initialize(&self) {
        let mut state = self.lock_state();
        if !state.closed && state.store.is_none() && !state.open_failed {
            if self.clear_on_first_init.swap(false, Ordering::AcqRel)
                && let Err(e) = std::fs::remove_dir_all(&self.dir)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(dir = %self.dir.display(), error = %e, "failed to clear disk cache on start");
            }
            match DiskStore::open(&self.dir, self.capacity) {
                Ok(store) => {
                    info!(
                        dir = %self.dir.display(),
                        records = store.len(),
                        bytes = store.total_bytes(),
                        "disk cache ready"
                    );
                    state.store = Some(store);
                }
                Err(e) => {
                    state.open_failed = true;
                    warn!(dir = %self.dir.display(), error = %e, "disk cache unavailable, tier disabled");
                }
            }
        }
        state.initializing = false;
        self.cond.notify_all();
    }

    /// Waits until initialization is not pending. Loops over the condvar
    /// wait, so spurious wakeups are harmless.
    fn wait_ready(&self) -> MutexGuard<'_, TierState> {
        let mut state = self.lock_state();
        while state.initializing {
            state = self.cond.wait(state).expect("disk tier lock poisoned");
        }
        state
    }

    fn get_blocking(&self, digest: &str) -> Option<Vec<u8>> {
        let mut state = self.wait_ready();
        state.store.as_mut()?.get(digest)
    }

    fn contains_blocking(&self, digest: &str) -> bool {
        let state = self.wait_ready();
        state.store.as_ref().is_some_and(|s| s.contains(digest))
    }

    fn remove_blocking(&self, digest: &str) {
        let mut state = self.wait_ready();
        if let Some(store) = state.store.as_mut() {
            store.remove(digest);
        }
    }

    fn put_blocking(&self, digest: &str, blob: &[u8]) {
        let mut state = self.wait_ready();
        if let Some(store) = state.store.as_mut()
            && let Err(e) = store.put(digest, blob)
        {
            warn!(digest, error = %e, "disk cache write failed");
        }
    }

    fn flush_blocking(&self) {
        let mut state = self.lock_state();
        if let Some(store) = state.store.as_mut()
            && let Err(e) = store.flush()
        {
            warn!(error = %e, "disk cache flush failed");
        }
    }

    /// Deletes and reopens the store. A tier that never opened (or whose
    /// open failed) has nothing to delete and stays as it is.
    fn clear_blocking(&self) {
        let mut state = self.wait_ready();
        if state.closed {
            return;
        }
        let Some(store) = state.store.take() else {
            return;
        };
        state.initializing = true;

        if let Err(e) = store.delete_all() {
            warn!(dir = %self.dir.display(), error = %e, "failed to delete disk cache");
        }
        match DiskStore::open(&self.dir, self.capacity) {
            Ok(store) => {
                info!(dir = %self.dir.display(), "disk cache cleared and reopened");
                state.store = Some(store);
            }
            Err(e) => {
                state.open_failed = true;
                warn!(dir = %self.dir.display(), error = %e, "disk cache reopen failed, tier disabled");
            }
        }
        state.initializing = false;
        self.cond.notify_all();
    }

    fn shutdown_blocking(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(store) = state.store.take() {
            store.close();
        }
        // Wake anyone still waiting for initialization; they observe a
        // closed tier and report a miss instead of deadlocking.
        state.initializing = false;
        self.cond.notify_all();
        debug!("disk cache closed");
    }
}
