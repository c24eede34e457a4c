//! Key-value store implementations.
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions
//! - [`FileStore`]: a JSON file, rewritten atomically shortly after changes

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use curio_core::constants::{STORE_FLUSH_DELAY, STORE_RETENTION, STORE_SWEEP_INTERVAL};
use curio_core::error::{CurioError, Result};
use curio_core::traits::{Clock, KeyValueStore};
use curio_core::SystemClock;

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns every stored key.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Tuning for a [`FileStore`].
#[derive(Clone)]
pub struct FileStoreConfig {
    /// Entries stamped longer ago than this are swept
    pub retention: Duration,
    /// Writes are gathered for this long before the file is rewritten;
    /// zero writes through
    pub flush_delay: Duration,
    /// Minimum time between sweeps after the one on open
    pub sweep_interval: Duration,
    /// Time source for sweeps
    pub clock: Arc<dyn Clock>,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            retention: STORE_RETENTION,
            flush_delay: STORE_FLUSH_DELAY,
            sweep_interval: STORE_SWEEP_INTERVAL,
            clock: Arc::new(SystemClock),
        }
    }
}

impl FileStoreConfig {
    /// Sets the retention.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the flush delay.
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = delay;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// File-backed key-value store.
///
/// Keeps the whole map in memory. Changes mark the store dirty and one
/// delayed task rewrites the file (temp file, then rename) for every write
/// made in the meantime. Values stamped with a `timestamp` older than the
/// retention are swept on open and periodically on flush.
pub struct FileStore {
    inner: Arc<FileInner>,
}

struct FileInner {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
    config: FileStoreConfig,
    dirty: AtomicBool,
    flush_scheduled: AtomicBool,
    last_sweep: AtomicU64,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path` with default tuning.
    ///
    /// The file is created on first flush.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, FileStoreConfig::default()).await
    }

    /// Opens the store at `path`, loading and sweeping it if the file exists.
    pub async fn open_with(path: impl AsRef<Path>, config: FileStoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if fs::try_exists(&path).await? {
            let contents = fs::read(&path).await?;
            if contents.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_slice(&contents).map_err(|e| {
                    CurioError::StorageError(format!("corrupt store {}: {}", path.display(), e))
                })?
            }
        } else {
            HashMap::new()
        };

        let store = Self {
            inner: Arc::new(FileInner {
                path,
                entries: RwLock::new(entries),
                last_sweep: AtomicU64::new(config.clock.now_ms()),
                config,
                dirty: AtomicBool::new(false),
                flush_scheduled: AtomicBool::new(false),
                write_lock: Mutex::new(()),
            }),
        };

        let swept = store.inner.sweep();
        if swept > 0 {
            store.inner.dirty.store(true, Ordering::Release);
            store.inner.flush().await?;
        }

        info!(path = ?store.inner.path, keys = store.len(), swept, "Opened file store");
        Ok(store)
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Removes expired entries now, returning how many went.
    pub fn sweep(&self) -> usize {
        let swept = self.inner.sweep();
        if swept > 0 {
            self.inner.dirty.store(true, Ordering::Release);
        }
        swept
    }

    async fn changed(&self) -> Result<()> {
        self.inner.dirty.store(true, Ordering::Release);

        if self.inner.config.flush_delay.is_zero() {
            return self.inner.flush().await;
        }
        if self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.flush_delay).await;
            inner.flush_scheduled.store(false, Ordering::Release);
            if let Err(e) = inner.flush().await {
                warn!(path = ?inner.path, error = %e, "Store flush failed");
            }
        });
        Ok(())
    }
}

impl FileInner {
    fn sweep(&self) -> usize {
        let now = self.config.clock.now_ms();
        self.last_sweep.store(now, Ordering::Release);
        let retention = self.config.retention.as_millis() as u64;

        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, raw| {
            stamped_at(raw).map_or(true, |ts| now.saturating_sub(ts) < retention)
        });
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, "Swept expired entries");
        }
        swept
    }

    fn sweep_due(&self) -> bool {
        let now = self.config.clock.now_ms();
        let last = self.last_sweep.load(Ordering::Acquire);
        now.saturating_sub(last) >= self.config.sweep_interval.as_millis() as u64
    }

    #[instrument(skip(self))]
    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.sweep_due() && self.sweep() > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let written = self.write_file().await;
        if written.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        written
    }

    async fn write_file(&self) -> Result<()> {
        let serialized = {
            let entries = self.entries.read();
            serde_json::to_vec(&*entries)?
        };

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&serialized).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        debug!(bytes = serialized.len(), "Store saved");
        Ok(())
    }
}

impl Drop for FileInner {
    fn drop(&mut self) {
        if self.dirty.load(Ordering::Acquire) {
            warn!(path = ?self.path, "File store dropped with unsaved changes");
        }
    }
}

/// Write time of a stored value, if it carries one.
fn stamped_at(raw: &str) -> Option<u64> {
    #[derive(Deserialize)]
    struct Stamp {
        timestamp: Option<u64>,
    }
    serde_json::from_str::<Stamp>(raw).ok()?.timestamp
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.inner.entries.write().insert(key.to_string(), value);
        self.changed().await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = self.inner.entries.write().remove(key).is_some();
        if removed {
            self.changed().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}
