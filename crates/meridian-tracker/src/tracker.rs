//! The file tracker: scan, compare, watch, recover.

use crate::diff::{compare_snapshots, ChangeStatus, Differences};
use crate::error::{Result, TrackerError};
use crate::snapshot::{hash_file, load_snapshot, save_snapshot, FileEntry, Snapshot};
use chrono::{DateTime, Local, Utc};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Callback invoked by the watcher with the changed path and `"new"` or
/// `"modified"`. Deletions are reported by [`FileTracker::compare`] only.
pub type ChangeCallback = Arc<dyn Fn(&Path, &str) + Send + Sync>;

/// Watcher poll interval.
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Files per concurrent batch in [`FileTracker::batch_process`].
const PROCESS_BATCH_SIZE: usize = 100;

/// Snapshot of tracker statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    /// Files in the most recent scan.
    pub total: usize,
    /// Paths classified modified by the last compare.
    pub modified: usize,
    /// Paths classified new by the last compare.
    pub new: usize,
    /// Paths classified deleted by the last compare.
    pub deleted: usize,
    /// When the last compare ran.
    pub last_scan_time: Option<DateTime<Utc>>,
    /// Whether the background watcher is running.
    pub watching: bool,
    /// Whether the mtime cache is enabled.
    pub cache_enabled: bool,
    /// Entries currently held by the mtime cache.
    pub cache_size: usize,
}

#[derive(Default)]
struct ScanCounts {
    total: usize,
    modified: usize,
    new: usize,
    deleted: usize,
    last_scan_time: Option<DateTime<Utc>>,
}

struct TrackerState {
    file_types: Vec<String>,
    encryption_key: Option<String>,
    old: Snapshot,
    new: Snapshot,
    differences: Differences,
    counts: ScanCounts,
}

struct MtimeCache {
    enabled: bool,
    max_size: usize,
    entries: LruCache<String, SystemTime>,
}

impl MtimeCache {
    /// Insert respecting the size bound: when full, evict ~20% of the least
    /// recently used entries before inserting.
    fn insert(&mut self, path: String, mtime: SystemTime) {
        if self.entries.len() >= self.max_size {
            let evict = (self.max_size / 5).max(1);
            for _ in 0..evict {
                if self.entries.pop_lru().is_none() {
                    break;
                }
            }
        }
        self.entries.put(path, mtime);
    }
}

struct TrackerInner {
    root: PathBuf,
    snapshot_path: PathBuf,
    recursive: bool,
    state: RwLock<TrackerState>,
    cache: Mutex<MtimeCache>,
    watching: Arc<AtomicBool>,
    watch_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    callback: RwLock<Option<ChangeCallback>>,
    /// Scan worker pool sized to hardware concurrency; `None` falls back to
    /// the global pool.
    scan_pool: Option<rayon::ThreadPool>,
}

/// Tracks the files of a directory across scans.
///
/// Cloning is cheap and shares the underlying state, so a tracker can be
/// handed to background tasks.
#[derive(Clone)]
pub struct FileTracker {
    inner: Arc<TrackerInner>,
}

impl fmt::Debug for FileTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTracker")
            .field("root", &self.inner.root)
            .field("snapshot_path", &self.inner.snapshot_path)
            .field("recursive", &self.inner.recursive)
            .field("watching", &self.inner.watching.load(Ordering::Relaxed))
            .finish()
    }
}

fn normalize_type(file_type: &str) -> String {
    if file_type.starts_with('.') {
        file_type.to_string()
    } else {
        format!(".{file_type}")
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Hash a file list into snapshot entries on the calling rayon pool.
fn hash_entries(files: &[PathBuf]) -> Snapshot {
    files
        .par_iter()
        .filter_map(|path| FileTracker::process_file(path))
        .collect()
}

impl FileTracker {
    /// Create a tracker over `root`, persisting snapshots at
    /// `snapshot_path` and following only the given extensions. An invalid
    /// root is rejected at the first [`FileTracker::scan`].
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        file_types: &[&str],
        recursive: bool,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                root: root.into(),
                snapshot_path: snapshot_path.into(),
                recursive,
                state: RwLock::new(TrackerState {
                    file_types: file_types.iter().map(|t| normalize_type(t)).collect(),
                    encryption_key: None,
                    old: Snapshot::new(),
                    new: Snapshot::new(),
                    differences: Differences::new(),
                    counts: ScanCounts::default(),
                }),
                cache: Mutex::new(MtimeCache {
                    enabled: false,
                    max_size: 1000,
                    entries: LruCache::unbounded(),
                }),
                watching: Arc::new(AtomicBool::new(false)),
                watch_handle: Mutex::new(None),
                callback: RwLock::new(None),
                scan_pool: rayon::ThreadPoolBuilder::new()
                    .num_threads(num_cpus::get())
                    .thread_name(|i| format!("tracker-scan-{i}"))
                    .build()
                    .map_err(|e| warn!(error = %e, "falling back to global scan pool"))
                    .ok(),
            }),
        }
    }

    fn matching_files(&self, types: &[String]) -> Vec<PathBuf> {
        let walker = if self.inner.recursive {
            WalkDir::new(&self.inner.root)
        } else {
            WalkDir::new(&self.inner.root).max_depth(1)
        };
        walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .is_some_and(|ext| types.iter().any(|t| t == &ext))
            })
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }

    fn process_file(path: &Path) -> Option<(String, FileEntry)> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                return None;
            }
        };
        let hash = match hash_file(path) {
            Ok(h) => h,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unhashable file");
                return None;
            }
        };
        let last_write_time = metadata
            .modified()
            .map(format_time)
            .unwrap_or_default();
        let file_type = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        Some((
            path.display().to_string(),
            FileEntry {
                last_write_time,
                hash,
                size: metadata.len(),
                file_type,
            },
        ))
    }

    /// Scan the directory: load the previous snapshot (decrypting if a key
    /// is set), hash every matching file across the worker pool, and write
    /// the new snapshot atomically.
    ///
    /// A single unreadable file is logged and skipped; the scan continues.
    ///
    /// # Errors
    /// Fails when the root is not a directory, the previous snapshot cannot
    /// be read or decrypted, or the new snapshot cannot be written.
    pub fn scan(&self) -> Result<()> {
        if !self.inner.root.is_dir() {
            return Err(TrackerError::InvalidRoot {
                path: self.inner.root.clone(),
            });
        }

        let (key, types) = {
            let state = self.inner.state.read();
            (state.encryption_key.clone(), state.file_types.clone())
        };

        let old = load_snapshot(&self.inner.snapshot_path, key.as_deref())?;
        let files = self.matching_files(&types);
        debug!(count = files.len(), root = %self.inner.root.display(), "scanning");

        let new: Snapshot = match &self.inner.scan_pool {
            Some(pool) => pool.install(|| hash_entries(&files)),
            None => hash_entries(&files),
        };

        save_snapshot(&self.inner.snapshot_path, &new, key.as_deref())?;

        let mut state = self.inner.state.write();
        state.old = old;
        state.new = new;
        info!(files = state.new.len(), "scan complete");
        Ok(())
    }

    /// Compare the snapshots produced by the last [`FileTracker::scan`] and
    /// refresh the statistics.
    pub fn compare(&self) {
        let mut state = self.inner.state.write();
        state.differences = compare_snapshots(&state.old, &state.new);

        let mut counts = ScanCounts {
            total: state.new.len(),
            last_scan_time: Some(Utc::now()),
            ..ScanCounts::default()
        };
        for change in state.differences.values() {
            match change.status {
                ChangeStatus::Modified => counts.modified += 1,
                ChangeStatus::New => counts.new += 1,
                ChangeStatus::Deleted => counts.deleted += 1,
            }
        }
        info!(
            total = counts.total,
            new = counts.new,
            modified = counts.modified,
            deleted = counts.deleted,
            "compare complete"
        );
        state.counts = counts;
    }

    /// The differences produced by the last [`FileTracker::compare`].
    #[must_use]
    pub fn differences(&self) -> Differences {
        self.inner.state.read().differences.clone()
    }

    /// Append the differences to a text log: one `File: <path>, Status:
    /// <status>` line per change, followed by its raw diff body.
    ///
    /// # Errors
    /// Fails when the log file cannot be opened or written.
    pub fn log_differences(&self, log_path: impl AsRef<Path>) -> Result<()> {
        let log_path = log_path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| TrackerError::io(log_path, e))?;

        let state = self.inner.state.read();
        for (path, change) in &state.differences {
            writeln!(file, "File: {path}, Status: {}", change.status)
                .map_err(|e| TrackerError::io(log_path, e))?;
            for line in &change.diff {
                writeln!(file, "{line}").map_err(|e| TrackerError::io(log_path, e))?;
            }
        }
        Ok(())
    }

    /// Recreate a placeholder for every file in the given snapshot that no
    /// longer exists on disk. The placeholder records the prior modification
    /// time; this is a best-effort marker, not content recovery. Files that
    /// cannot be written are ignored.
    ///
    /// # Errors
    /// Fails when the snapshot itself cannot be loaded.
    pub fn recover(&self, snapshot_path: impl AsRef<Path>) -> Result<()> {
        let key = self.inner.state.read().encryption_key.clone();
        let snapshot = load_snapshot(snapshot_path.as_ref(), key.as_deref())?;

        for (path, entry) in &snapshot {
            if !Path::new(path).exists() {
                let marker = format!(
                    "This file was recovered based on version: {}\n",
                    entry.last_write_time
                );
                if let Err(e) = std::fs::write(path, marker) {
                    warn!(path, error = %e, "could not write recovery marker");
                }
            }
        }
        Ok(())
    }

    /// Run [`FileTracker::scan`] on a background task, returning a
    /// completion handle.
    #[must_use]
    pub fn async_scan(&self) -> JoinHandle<Result<()>> {
        let tracker = self.clone();
        tokio::task::spawn_blocking(move || tracker.scan())
    }

    /// Run [`FileTracker::compare`] on a background task, returning a
    /// completion handle.
    #[must_use]
    pub fn async_compare(&self) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::task::spawn_blocking(move || tracker.compare())
    }

    /// Add an extension to the tracked set. Accepts `txt` or `.txt`.
    pub fn add_file_type(&self, file_type: &str) {
        let normalized = normalize_type(file_type);
        let mut state = self.inner.state.write();
        if !state.file_types.contains(&normalized) {
            state.file_types.push(normalized);
        }
    }

    /// Remove an extension from the tracked set.
    pub fn remove_file_type(&self, file_type: &str) {
        let normalized = normalize_type(file_type);
        self.inner
            .state
            .write()
            .file_types
            .retain(|t| t != &normalized);
    }

    /// Extensions currently tracked.
    #[must_use]
    pub fn tracked_file_types(&self) -> Vec<String> {
        self.inner.state.read().file_types.clone()
    }

    /// Set the key used to encrypt and decrypt snapshots at rest.
    pub fn set_encryption_key(&self, key: impl Into<String>) {
        self.inner.state.write().encryption_key = Some(key.into());
    }

    /// Latest scan entry for a path, if tracked.
    #[must_use]
    pub fn get_file_info(&self, path: &Path) -> Option<FileEntry> {
        self.inner
            .state
            .read()
            .new
            .get(&path.display().to_string())
            .cloned()
    }

    /// Apply a function to every currently matching file on disk.
    pub fn for_each_file(&self, mut func: impl FnMut(&Path)) {
        let types = self.inner.state.read().file_types.clone();
        for path in self.matching_files(&types) {
            func(&path);
        }
    }

    /// Register the watcher change callback.
    pub fn set_change_callback(&self, callback: ChangeCallback) {
        *self.inner.callback.write() = Some(callback);
    }

    /// Start the background watcher. A second call while running is a no-op.
    ///
    /// The watcher polls every second, compares each matching file's mtime
    /// against the cache and delivers `"new"` / `"modified"` callbacks.
    pub fn start_watching(&self) {
        if self.inner.watching.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(root = %self.inner.root.display(), "starting watcher");
        // The thread holds only a weak reference so an abandoned tracker can
        // still be dropped; the loop exits when the tracker is gone.
        let weak = Arc::downgrade(&self.inner);
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(WATCH_INTERVAL);
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if !inner.watching.load(Ordering::SeqCst) {
                break;
            }
            let tracker = FileTracker { inner };
            tracker.watch_tick();
        });
        *self.inner.watch_handle.lock() = Some(handle);
    }

    /// Signal the watcher to exit and join it.
    pub fn stop_watching(&self) {
        self.inner.watching.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.watch_handle.lock().take() {
            if handle.join().is_err() {
                warn!("watcher thread panicked");
            }
        }
    }

    /// One watcher poll: compare every matching file's mtime against the
    /// cache and deliver callbacks for unseen or newer files.
    fn watch_tick(&self) {
        let types = self.inner.state.read().file_types.clone();
        let mut events: Vec<(PathBuf, &'static str)> = Vec::new();
        {
            let mut cache = self.inner.cache.lock();
            for path in self.matching_files(&types) {
                let Ok(metadata) = std::fs::metadata(&path) else {
                    continue;
                };
                let Ok(mtime) = metadata.modified() else {
                    continue;
                };
                let key = path.display().to_string();
                match cache.entries.get(&key) {
                    Some(cached) if mtime > *cached => {
                        cache.insert(key, mtime);
                        events.push((path, "modified"));
                    }
                    Some(_) => {}
                    None => {
                        cache.insert(key, mtime);
                        events.push((path, "new"));
                    }
                }
            }
        }

        if events.is_empty() {
            return;
        }
        let callback = self.inner.callback.read().clone();
        if let Some(callback) = callback {
            for (path, kind) in events {
                debug!(path = %path.display(), kind, "watcher change");
                callback(&path, kind);
            }
        }
    }

    /// Process files in fixed batches of 100, running the members of each
    /// batch concurrently and awaiting the whole batch before the next.
    pub async fn batch_process(
        &self,
        files: Vec<PathBuf>,
        processor: Arc<dyn Fn(&Path) + Send + Sync>,
    ) {
        for chunk in files.chunks(PROCESS_BATCH_SIZE) {
            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|path| {
                    let processor = processor.clone();
                    tokio::task::spawn_blocking(move || processor(&path))
                })
                .collect();
            for handle in handles {
                if handle.await.is_err() {
                    warn!("batch processor task failed");
                }
            }
        }
    }

    /// Enable or disable the mtime cache. Idempotent; disabling clears it.
    pub fn enable_cache(&self, enable: bool) {
        let mut cache = self.inner.cache.lock();
        cache.enabled = enable;
        if !enable {
            cache.entries.clear();
        }
    }

    /// Bound the mtime cache.
    ///
    /// # Errors
    /// Rejects a zero size.
    pub fn set_cache_size(&self, max_size: usize) -> Result<()> {
        if max_size == 0 {
            return Err(TrackerError::InvalidArgument(
                "cache size must be non-zero".to_string(),
            ));
        }
        let mut cache = self.inner.cache.lock();
        cache.max_size = max_size;
        while cache.entries.len() > max_size {
            cache.entries.pop_lru();
        }
        Ok(())
    }

    /// Statistics as a JSON object.
    #[must_use]
    pub fn get_statistics(&self) -> serde_json::Value {
        let stats = self.get_current_stats();
        serde_json::json!({
            "total_files": stats.total,
            "modified_files": stats.modified,
            "new_files": stats.new,
            "deleted_files": stats.deleted,
            "last_scan_time": stats
                .last_scan_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            "watching": stats.watching,
            "cache_enabled": stats.cache_enabled,
            "cache_size": stats.cache_size,
        })
    }

    /// The current [`FileStats`].
    #[must_use]
    pub fn get_current_stats(&self) -> FileStats {
        let state = self.inner.state.read();
        let cache = self.inner.cache.lock();
        FileStats {
            total: state.counts.total,
            modified: state.counts.modified,
            new: state.counts.new,
            deleted: state.counts.deleted,
            last_scan_time: state.counts.last_scan_time,
            watching: self.inner.watching.load(Ordering::Relaxed),
            cache_enabled: cache.enabled,
            cache_size: cache.entries.len(),
        }
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.watching.store(false, Ordering::SeqCst);
        if let Some(handle) = self.watch_handle.lock().take() {
            // The final drop can run on the watcher thread itself when the
            // last external handle disappears mid-tick; never join there.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
