//! File-based cache driver.
//!
//! Entries are JSON files carrying their value and an expiry
//! timestamp, stored under a two-level directory layout derived from
//! the hashed key (256 fan-out directories). Suitable for development
//! and single-host deployments; a shared store should back multi-host
//! setups.
//!
//! A background garbage collector sweeps expired files on an interval
//! and is stoppable, so shutdown can prove the sweep has terminated.
//!
//! # Example
//!
//! ```no_run
//! use trellis_cache::FileCache;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), trellis_cache::CacheError> {
//! let cache = FileCache::new("/var/cache/app").await?;
//! cache.put("greeting", &"hello", Some(Duration::from_secs(60))).await?;
//!
//! let value = cache.get("greeting").await?;
//! assert_eq!(value, Some(serde_json::json!("hello")));
//!
//! cache.stop(); // stop the GC at shutdown
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;

use trellis_core::StopSignal;

/// How often the garbage collector sweeps.
const GC_INTERVAL: Duration = Duration::from_secs(600);

/// Cache driver errors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Entry serialization failure.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// On-disk entry shape: the value plus its expiry (0 = no expiry).
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A file-backed cache with TTL support and background GC.
pub struct FileCache {
    dir: PathBuf,
    /// Serializes read-modify-write sequences within this process.
    lock: RwLock<()>,
    stop: StopSignal,
}

impl FileCache {
    /// Opens (creating if needed) a cache rooted at `dir` and spawns
    /// its garbage collector.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(dir: impl AsRef<Path>) -> Result<Arc<Self>, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let cache = Arc::new(Self {
            dir,
            lock: RwLock::new(()),
            stop: StopSignal::new(),
        });

        let gc = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match gc.sweep().await {
                            Ok(removed) if removed > 0 => {
                                tracing::debug!(removed, "file cache removed expired entries");
                            }
                            Ok(_) => {}
                            Err(error) => {
                                tracing::warn!(%error, "file cache sweep failed");
                            }
                        }
                    }
                    () = gc.stop.stopped() => break,
                }
            }
            tracing::debug!("file cache garbage collector stopped");
        });

        Ok(cache)
    }

    /// Stops the garbage collector.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns `true` once the GC has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Maps a key to its file path: hashed, with a 2-character fan-out
    /// directory so no single directory grows unbounded.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(&hex[..2]).join(hex)
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(entry)?).await?;
        Ok(())
    }

    /// Stores a value under `key`, expiring after `ttl` (or never).
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;
        let entry = CacheEntry {
            value: serde_json::to_value(value)?,
            expires_at: ttl.map_or(0, |ttl| unix_now() + ttl.as_secs()),
        };
        self.write_entry(key, &entry).await
    }

    /// Reads a value. Expired entries are deleted and reported absent.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CacheError> {
        {
            let _guard = self.lock.read().await;
            match self.read_entry(key).await? {
                Some(entry) if !entry.is_expired(unix_now()) => return Ok(Some(entry.value)),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop the file outside the read guard.
        self.forget(key).await?;
        Ok(None)
    }

    /// Removes a key.
    pub async fn forget(&self, key: &str) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every entry.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;
        let mut dirs = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dirs.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Adds `by` to the integer stored under `key` (0 when absent) and
    /// returns the new value, preserving any existing expiry.
    ///
    /// The read-modify-write is serialized within this process only;
    /// it is not atomic across processes.
    pub async fn increment(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        let _guard = self.lock.write().await;
        let now = unix_now();

        let existing = self.read_entry(key).await?.filter(|e| !e.is_expired(now));
        let current = existing
            .as_ref()
            .and_then(|e| e.value.as_i64())
            .unwrap_or(0);
        let next = current + by;

        let entry = CacheEntry {
            value: serde_json::Value::from(next),
            expires_at: existing.map_or(0, |e| e.expires_at),
        };
        self.write_entry(key, &entry).await?;
        Ok(next)
    }

    /// Deletes every expired entry file. Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize, CacheError> {
        let _guard = self.lock.write().await;
        let now = unix_now();
        let mut removed = 0;

        let mut dirs = tokio::fs::read_dir(&self.dir).await?;
        while let Some(subdir) = dirs.next_entry().await? {
            if !subdir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(subdir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let Ok(bytes) = tokio::fs::read(file.path()).await else {
                    continue;
                };
                let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) else {
                    continue;
                };
                if entry.is_expired(now) && tokio::fs::remove_file(file.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!(
            "trellis-cache-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ))
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        cache.put("user:1", &serde_json::json!({"name": "ada"}), None)
            .await
            .unwrap();

        let value = cache.get("user:1").await.unwrap().unwrap();
        assert_eq!(value["name"], "ada");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        assert!(cache.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        cache
            .put("ephemeral", &1, Some(Duration::ZERO))
            .await
            .unwrap();

        // Expiry has one-second granularity; wait out a full tick.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.get("ephemeral").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forget() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        cache.put("k", &"v", None).await.unwrap();
        cache.forget("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());

        // Forgetting an absent key is fine.
        cache.forget("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_removes_everything() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        cache.put("a", &1, None).await.unwrap();
        cache.put("b", &2, None).await.unwrap();

        cache.flush().await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        assert_eq!(cache.increment("counter", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("counter", 4).await.unwrap(), 5);
        assert_eq!(cache.increment("counter", -2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gc_is_stoppable() {
        let cache = FileCache::new(scratch_dir()).await.unwrap();
        assert!(!cache.is_stopped());
        cache.stop();
        assert!(cache.is_stopped());
    }
}
