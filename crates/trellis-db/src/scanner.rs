//! Row-to-record materialization with a cached, reaped field map.
//!
//! The first scan of a record type derives its column→field-path map
//! from the type's declarations and caches it keyed by `TypeId`; every
//! later scan reuses the cached map and refreshes its access time.
//! A background reaper evicts maps that have sat idle past a
//! configurable threshold, so a process that touches many record types
//! transiently does not hold their maps forever.
//!
//! Lock discipline: lookups take the read lock and touch `last_access`
//! under it (it is atomic); misses upgrade to the write lock with a
//! double-check against racing initialisation. The reaper sweeps under
//! the write lock.

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use trellis_core::StopSignal;

use crate::record::{FieldDecl, Record, ScanError};
use crate::value::Row;

/// Default sweep cadence: 10 minutes.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(600);
/// Default idle threshold: 30 minutes.
pub const DEFAULT_IDLE_MAX: Duration = Duration::from_secs(1800);

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

struct CacheEntry {
    mapping: Arc<HashMap<String, String>>,
    last_access: AtomicU64,
}

/// Derives the column→field-path map from field declarations.
///
/// Embedded records are recursed into and their entries spliced in
/// with the embedding field's name prefixed onto each path.
fn derive_field_map(fields: &[FieldDecl]) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for field in fields {
        match field {
            FieldDecl::Column { field, tag } => {
                let column = match *tag {
                    "-" => continue,
                    "" => field.to_lowercase(),
                    explicit => explicit.to_string(),
                };
                mapping.insert(column, (*field).to_string());
            }
            FieldDecl::Embedded { field, fields } => {
                for (column, path) in derive_field_map(&fields()) {
                    mapping.insert(column, format!("{field}.{path}"));
                }
            }
        }
    }
    mapping
}

/// The scanner: cached field maps plus the scan operations.
pub struct ScannerCache {
    entries: RwLock<HashMap<TypeId, CacheEntry>>,
    stop: StopSignal,
}

impl ScannerCache {
    /// Creates a cache without a reaper (tests, short-lived tools).
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            stop: StopSignal::new(),
        })
    }

    /// Creates a cache and spawns its idle reaper.
    ///
    /// The reaper sweeps every `interval` and evicts entries idle for
    /// longer than `idle_max`. It runs until [`ScannerCache::stop`].
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn init(interval: Duration, idle_max: Duration) -> Arc<Self> {
        let cache = Self::new();
        let reaper = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = reaper.sweep(unix_now(), idle_max);
                        if removed > 0 {
                            tracing::debug!(removed, "scanner cache evicted idle field maps");
                        }
                    }
                    () = reaper.stop.stopped() => break,
                }
            }
            tracing::debug!("scanner cache reaper stopped");
        });
        cache
    }

    /// Stops the background reaper.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns `true` once the reaper has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Returns the cached column→field-path map for `T`, deriving it
    /// on first use.
    pub fn field_map<T: Record>(&self) -> Arc<HashMap<String, String>> {
        let id = TypeId::of::<T>();

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&id) {
                entry.last_access.store(unix_now(), Ordering::Relaxed);
                return Arc::clone(&entry.mapping);
            }
        }

        let mut entries = self.entries.write();
        // Another scan may have initialised the entry while we waited.
        if let Some(entry) = entries.get(&id) {
            entry.last_access.store(unix_now(), Ordering::Relaxed);
            return Arc::clone(&entry.mapping);
        }

        let mapping = Arc::new(derive_field_map(&T::fields()));
        entries.insert(
            id,
            CacheEntry {
                mapping: Arc::clone(&mapping),
                last_access: AtomicU64::new(unix_now()),
            },
        );
        mapping
    }

    /// Populates `dest` from one row.
    ///
    /// Columns without a mapped field are read and discarded; mapped
    /// columns are routed through the record's path-addressed binding.
    pub fn scan_struct<T: Record>(&self, row: &Row, dest: &mut T) -> Result<(), ScanError> {
        let mapping = self.field_map::<T>();
        for (index, column) in row.columns().iter().enumerate() {
            let Some(path) = mapping.get(column) else {
                continue;
            };
            let parts: Vec<&str> = path.split('.').collect();
            dest.bind(&parts, row.value(index).clone())?;
        }
        Ok(())
    }

    /// Scans every row into a fresh record appended to `dest`.
    pub fn scan_slice<T: Record>(&self, rows: &[Row], dest: &mut Vec<T>) -> Result<(), ScanError> {
        for row in rows {
            let mut record = T::default();
            self.scan_struct(row, &mut record)?;
            dest.push(record);
        }
        Ok(())
    }

    /// Evicts entries whose last access is older than `idle_max`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now_secs: u64, idle_max: Duration) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            now_secs.saturating_sub(entry.last_access.load(Ordering::Relaxed)) <= idle_max.as_secs()
        });
        before - entries.len()
    }

    /// Number of cached field maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when no field maps are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
