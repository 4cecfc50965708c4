//! Journal-backed, capacity-bounded digest-to-blob store.
//!
//! One blob file per record (`<digest>.img`) plus a `journal` file that
//! records puts, reads, and deletes so recency survives restarts. Blob
//! writes go through a temp file in the same directory and are persisted
//! with an atomic rename, so a reader can never observe a partial record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::{debug, trace, warn};

use crate::domain::errors::StoreError;

const JOURNAL_FILE: &str = "journal";
const JOURNAL_MAGIC: &str = "rastercache.journal.v1";
const BLOB_EXT: &str = "img";

/// Journal operations appended since the last compaction before the journal
/// is rewritten from the index.
const COMPACT_THRESHOLD: u32 = 2000;

/// Size-bounded persistent key-to-blob store keyed by digest.
///
/// Synchronous; callers run it from blocking contexts under the disk tier
/// mutex. Writes are once-per-key: a put for an existing digest keeps the
/// stored blob and skips the write, even if the bytes differ.
pub(crate) struct DiskStore {
    dir: PathBuf,
    capacity: u64,
    journal: BufWriter<File>,
    index: LruCache<String, u64>,
    total_bytes: u64,
    ops_since_compact: u32,
}

impl DiskStore {
    /// Opens (or creates) a store in `dir` bounded by `capacity` bytes.
    ///
    /// Requires a writable directory whose usable free space is strictly
    /// greater than `capacity`. An existing journal is replayed to restore
    /// the record index and its recency order; stale index lines, orphan
    /// blobs, and leftover temp files are cleaned up, and the journal is
    /// rewritten compactly.
    pub(crate) fn open(dir: &Path, capacity: u64) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;

        if let Some(available) = usable_space(dir)
            && available <= capacity
        {
            return Err(StoreError::InsufficientSpace {
                dir: dir.to_path_buf(),
                available,
                capacity,
            });
        }

        let mut index = replay_journal(dir);
        let total_bytes = reconcile_with_blobs(dir, &mut index);

        let mut store = Self {
            dir: dir.to_path_buf(),
            capacity,
            journal: rewrite_journal(dir, &index)?,
            index,
            total_bytes,
            ops_since_compact: 0,
        };
        store.evict_to_capacity();
        store.flush()?;

        debug!(
            dir = %store.dir.display(),
            records = store.index.len(),
            bytes = store.total_bytes,
            "opened disk cache"
        );
        Ok(store)
    }

    /// Reads the blob for `digest`, promoting the record.
    pub(crate) fn get(&mut self, digest: &str) -> Option<Vec<u8>> {
        self.index.get(digest)?;
        match fs::read(self.blob_path(digest)) {
            Ok(bytes) => {
                trace!(digest, "disk cache hit");
                self.append_op(&format!("READ {digest}"));
                Some(bytes)
            }
            Err(e) => {
                // The blob vanished underneath us; drop the record.
                warn!(digest, error = %e, "cached blob unreadable, dropping record");
                self.drop_record(digest);
                None
            }
        }
    }

    /// Writes a blob for `digest` unless one already exists (write-once per
    /// key; the existing record is promoted and left intact).
    pub(crate) fn put(&mut self, digest: &str, blob: &[u8]) -> Result<(), StoreError> {
        if self.index.get(digest).is_some() {
            trace!(digest, "record exists, skipping write");
            return Ok(());
        }

        let mut tmp = tempfile::Builder::new()
            .prefix("tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.blob_path(digest))
            .map_err(|e| StoreError::Io(e.error))?;

        let size = blob.len() as u64;
        self.index.push(digest.to_string(), size);
        self.total_bytes += size;
        self.append_op(&format!("PUT {digest} {size}"));
        debug!(digest, size, "stored blob in disk cache");

        self.evict_to_capacity();
        Ok(())
    }

    /// True if a record exists for `digest`, without promoting it.
    pub(crate) fn contains(&self, digest: &str) -> bool {
        self.index.contains(digest)
    }

    /// Removes the record for `digest`, if any.
    pub(crate) fn remove(&mut self, digest: &str) {
        if self.index.contains(digest) {
            self.drop_record(digest);
            debug!(digest, "removed record from disk cache");
        }
    }

    /// Flushes buffered journal writes to the filesystem.
    pub(crate) fn flush(&mut self) -> Result<(), StoreError> {
        self.journal.flush()?;
        Ok(())
    }

    /// Flushes and consumes the store.
    pub(crate) fn close(mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush journal on close");
        }
    }

    /// Deletes every record and the journal, consuming the store. The
    /// directory itself is removed; reopening recreates it.
    pub(crate) fn delete_all(self) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        drop(self);
        fs::remove_dir_all(&dir)?;
        debug!(dir = %dir.display(), "deleted disk cache");
        Ok(())
    }

    /// Number of stored records.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Running total of stored blob bytes.
    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.{BLOB_EXT}"))
    }

    fn drop_record(&mut self, digest: &str) {
        if let Some(size) = self.index.pop(digest) {
            self.total_bytes -= size;
        }
        if let Err(e) = fs::remove_file(self.blob_path(digest))
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(digest, error = %e, "failed to remove blob file");
        }
        self.append_op(&format!("DEL {digest}"));
    }

    fn evict_to_capacity(&mut self) {
        while self.total_bytes > self.capacity {
            let Some((digest, _)) = self.index.peek_lru().map(|(d, s)| (d.clone(), *s)) else {
                break;
            };
            debug!(digest = %digest, "disk cache over capacity, evicting LRU record");
            self.drop_record(&digest);
        }
    }

    fn append_op(&mut self, line: &str) {
        if let Err(e) = writeln!(self.journal, "{line}") {
            warn!(error = %e, "failed to append journal line");
            return;
        }
        self.ops_since_compact += 1;
        if self.ops_since_compact >= COMPACT_THRESHOLD {
            self.compact();
        }
    }

    fn compact(&mut self) {
        match rewrite_journal(&self.dir, &self.index) {
            Ok(journal) => {
                self.journal = journal;
                self.ops_since_compact = 0;
                trace!("compacted journal");
            }
            Err(e) => warn!(error = %e, "journal compaction failed"),
        }
    }
}

impl std::fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStore")
            .field("dir", &self.dir)
            .field("records", &self.index.len())
            .field("bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Rebuilds the recency-ordered index from the journal, if one exists and
/// carries the expected header. A missing or unreadable journal yields an
/// empty index; stale entries are reconciled against blob files afterwards.
fn replay_journal(dir: &Path) -> LruCache<String, u64> {
    let mut index: LruCache<String, u64> = LruCache::unbounded();
    let Ok(file) = File::open(dir.join(JOURNAL_FILE)) else {
        return index;
    };

    let mut lines = BufReader::new(file).lines();
    match lines.next() {
        Some(Ok(header)) if header == JOURNAL_MAGIC => {}
        _ => {
            warn!(dir = %dir.display(), "unrecognized journal header, rebuilding");
            return index;
        }
    }

    for line in lines.map_while(Result::ok) {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("PUT"), Some(digest), Some(size)) => {
                if let Ok(size) = size.parse::<u64>() {
                    index.push(digest.to_string(), size);
                }
            }
            (Some("READ"), Some(digest), None) => {
                index.promote(digest);
            }
            (Some("DEL"), Some(digest), None) => {
                index.pop(digest);
            }
            _ => trace!(line, "skipping malformed journal line"),
        }
    }
    index
}

/// Drops index entries whose blob is missing or has an unexpected size,
/// deletes blob and temp files the index does not know about, and returns
/// the reconciled byte total.
fn reconcile_with_blobs(dir: &Path, index: &mut LruCache<String, u64>) -> u64 {
    let stale: Vec<String> = index
        .iter()
        .filter(|(digest, size)| {
            let path = dir.join(format!("{digest}.{BLOB_EXT}"));
            fs::metadata(path).map(|m| m.len()).ok() != Some(**size)
        })
        .map(|(digest, _)| digest.clone())
        .collect();
    for digest in stale {
        warn!(digest = %digest, "journal entry without matching blob, dropping");
        index.pop(&digest);
    }

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == JOURNAL_FILE {
                continue;
            }
            let known = path
                .extension()
                .is_some_and(|ext| ext == BLOB_EXT)
                && path
                    .file_stem()
                    .is_some_and(|stem| index.contains(&stem.to_string_lossy().into_owned()));
            if !known {
                trace!(path = %path.display(), "removing orphan cache file");
                let _ = fs::remove_file(&path);
            }
        }
    }

    index.iter().map(|(_, size)| *size).sum()
}

/// Writes a compact journal (header plus one `PUT` line per record in
/// least-to-most recently used order) atomically and reopens it for append.
fn rewrite_journal(dir: &Path, index: &LruCache<String, u64>) -> Result<BufWriter<File>, StoreError> {
    let mut tmp = tempfile::Builder::new().prefix("tmp").tempfile_in(dir)?;
    writeln!(tmp, "{JOURNAL_MAGIC}")?;
    // Replay pushes in line order, so the most recent record goes last.
    for (digest, size) in index.iter().collect::<Vec<_>>().into_iter().rev() {
        writeln!(tmp, "PUT {digest} {size}")?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(JOURNAL_FILE))
        .map_err(|e| StoreError::Io(e.error))?;

    let file = OpenOptions::new()
        .append(true)
        .open(dir.join(JOURNAL_FILE))?;
    Ok(BufWriter::new(file))
}

/// Usable free space for the filesystem holding `dir`, from the mount with
/// the longest path prefix. `None` when no mount matches; the open
/// precondition is then skipped rather than failing the tier.
fn usable_space(dir: &Path) -> Option<u64> {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(sysinfo::Disk::available_space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &Path, capacity: u64) -> DiskStore {
        DiskStore::open(dir, capacity).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024);

        store.put("aaaa", b"hello blob").unwrap();
        assert_eq!(store.get("aaaa").unwrap(), b"hello blob");
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_bytes(), 10);
    }

    #[test]
    fn test_miss() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_write_once_keeps_first_value() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024);

        store.put("aaaa", b"first").unwrap();
        store.put("aaaa", b"second").unwrap();

        assert_eq!(store.get("aaaa").unwrap(), b"first");
        assert_eq!(store.total_bytes(), 5);
    }

    #[test]
    fn test_capacity_eviction_is_lru() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 10);

        store.put("aaaa", b"12345").unwrap();
        store.put("bbbb", b"12345").unwrap();
        // Touch A so B is the eviction candidate.
        assert!(store.get("aaaa").is_some());
        store.put("cccc", b"12345").unwrap();

        assert!(store.contains("aaaa"));
        assert!(!store.contains("bbbb"));
        assert!(store.contains("cccc"));
        assert!(store.total_bytes() <= 10);
    }

    #[test]
    fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024);

        store.put("aaaa", b"data").unwrap();
        store.remove("aaaa");

        assert!(!store.contains("aaaa"));
        assert!(store.get("aaaa").is_none());
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_reopen_restores_records() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open_store(tmp.path(), 1024);
            store.put("aaaa", b"persisted").unwrap();
            store.flush().unwrap();
        }

        let mut store = open_store(tmp.path(), 1024);
        assert_eq!(store.get("aaaa").unwrap(), b"persisted");
    }

    #[test]
    fn test_reopen_restores_recency_order() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open_store(tmp.path(), 1024);
            store.put("aaaa", b"12345").unwrap();
            store.put("bbbb", b"12345").unwrap();
            // READ line makes A most recent across sessions.
            assert!(store.get("aaaa").is_some());
            store.flush().unwrap();
        }

        // Reduced capacity forces one eviction on open: B must go first.
        let store = open_store(tmp.path(), 5);
        assert!(store.contains("aaaa"));
        assert!(!store.contains("bbbb"));
    }

    #[test]
    fn test_partial_blob_never_observable() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024);
        store.put("aaaa", b"full contents").unwrap();

        // Nothing but complete blobs and the journal live in the directory.
        for entry in fs::read_dir(tmp.path()).unwrap().flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(
                name == "journal" || name.ends_with(".img"),
                "unexpected file: {name}"
            );
        }
        assert_eq!(store.get("aaaa").unwrap(), b"full contents");
    }

    #[test]
    fn test_orphan_blobs_removed_on_open() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open_store(tmp.path(), 1024);
            store.put("aaaa", b"kept").unwrap();
            store.flush().unwrap();
        }
        fs::write(tmp.path().join("ffff.img"), b"orphan").unwrap();
        fs::write(tmp.path().join("tmpleftover"), b"tmp").unwrap();

        let mut store = open_store(tmp.path(), 1024);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("aaaa").unwrap(), b"kept");
        assert!(!tmp.path().join("ffff.img").exists());
        assert!(!tmp.path().join("tmpleftover").exists());
    }

    #[test]
    fn test_corrupt_journal_starts_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("journal"), b"not a journal\nPUT aaaa 4\n").unwrap();
        fs::write(tmp.path().join("aaaa.img"), b"data").unwrap();

        let mut store = open_store(tmp.path(), 1024);
        assert_eq!(store.len(), 0);
        assert!(store.get("aaaa").is_none());
    }

    #[test]
    fn test_missing_blob_dropped_on_open() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = open_store(tmp.path(), 1024);
            store.put("aaaa", b"data").unwrap();
            store.flush().unwrap();
        }
        fs::remove_file(tmp.path().join("aaaa.img")).unwrap();

        let store = open_store(tmp.path(), 1024);
        assert_eq!(store.len(), 0);
        assert_eq!(store.total_bytes(), 0);
    }

    #[test]
    fn test_delete_all_removes_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        let mut store = open_store(&dir, 1024);
        store.put("aaaa", b"data").unwrap();

        store.delete_all().unwrap();
        assert!(!dir.exists());

        // Reopening recreates the directory from scratch.
        let store = open_store(&dir, 1024);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_insufficient_space_rejected() {
        let tmp = TempDir::new().unwrap();
        // Only meaningful where the mount for the temp dir is resolvable.
        if usable_space(tmp.path()).is_some() {
            let result = DiskStore::open(tmp.path(), u64::MAX);
            assert!(matches!(
                result,
                Err(StoreError::InsufficientSpace { .. })
            ));
        }
    }

    #[test]
    fn test_journal_compaction_preserves_records() {
        let tmp = TempDir::new().unwrap();
        let mut store = open_store(tmp.path(), 1024 * 1024);
        store.put("aaaa", b"a").unwrap();
        for _ in 0..COMPACT_THRESHOLD {
            assert!(store.get("aaaa").is_some());
        }
        store.flush().unwrap();
        drop(store);

        let mut store = open_store(tmp.path(), 1024 * 1024);
        assert_eq!(store.get("aaaa").unwrap(), b"a");
    }
}
