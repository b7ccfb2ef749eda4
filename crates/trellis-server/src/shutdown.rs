//! Coordinated shutdown.
//!
//! [`wait_for_signal`] resolves on `SIGTERM` or `SIGINT`.
//! [`ConnectionTracker`] counts in-flight connections through RAII
//! tokens so the drain step can wait for them. [`Teardown`] runs the
//! staged stop sequence:
//!
//! 1. stop accepting connections, drain in-flight requests under the
//!    deadline
//! 2. stop every registered rate-limiter reaper
//! 3. stop the scanner-cache reaper
//! 4. stop the file-cache garbage collector
//! 5. close external drivers (redis, mail, queue) via registered hooks
//! 6. close the database pool
//!
//! Every step logs its outcome; a failing step never blocks the next.

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trellis_cache::FileCache;
use trellis_core::StopSignal;
use trellis_db::Database;
use trellis_middleware::LimiterRegistry;

use crate::config::DEFAULT_SHUTDOWN_TIMEOUT_SECS;

/// Waits for an OS shutdown signal.
///
/// On Unix this is `SIGTERM` or `SIGINT`; elsewhere, Ctrl+C.
///
/// # Panics
///
/// Panics if signal handlers cannot be registered.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("wait for Ctrl+C");
        tracing::info!("received Ctrl+C, shutting down");
    }
}

/// Counts in-flight connections via RAII tokens.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<tokio::sync::Notify>,
}

impl ConnectionTracker {
    /// Creates a tracker with zero connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a token; hold it for the connection's lifetime.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Current number of live tokens.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every token has been dropped.
    pub async fn drained(&self) {
        loop {
            // Register the waiter before re-checking the counter so a
            // token dropped in between still wakes us.
            let notified = self.notify.notified();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII token for one live connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<tokio::sync::Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        let previous = self.active.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.notify.notify_waiters();
        }
    }
}

type DriverHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send>;

/// The staged teardown runner.
///
/// # Example
///
/// ```no_run
/// use trellis_server::{wait_for_signal, Teardown};
/// # async fn run(
/// #     server: trellis_server::Server,
/// #     limiters: std::sync::Arc<trellis_middleware::LimiterRegistry>,
/// #     scanner: std::sync::Arc<trellis_db::ScannerCache>,
/// #     db: std::sync::Arc<trellis_db::Database>,
/// # ) {
/// let teardown = Teardown::new()
///     .http(server.stop_signal(), server.tracker())
///     .limiters(limiters)
///     .scanner(scanner)
///     .database(db);
///
/// wait_for_signal().await;
/// teardown.run().await;
/// # }
/// ```
pub struct Teardown {
    deadline: Duration,
    http: Option<(StopSignal, ConnectionTracker)>,
    limiters: Option<Arc<LimiterRegistry>>,
    scanner: Option<Arc<trellis_db::ScannerCache>>,
    file_cache: Option<Arc<FileCache>>,
    drivers: Vec<(String, DriverHook)>,
    database: Option<Arc<Database>>,
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

impl Teardown {
    /// Creates an empty teardown with the default 30-second deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deadline: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            http: None,
            limiters: None,
            scanner: None,
            file_cache: None,
            drivers: Vec::new(),
            database: None,
        }
    }

    /// Sets the per-step deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Registers the HTTP server's stop signal and tracker.
    #[must_use]
    pub fn http(mut self, stop: StopSignal, tracker: ConnectionTracker) -> Self {
        self.http = Some((stop, tracker));
        self
    }

    /// Registers the rate-limiter registry.
    #[must_use]
    pub fn limiters(mut self, registry: Arc<LimiterRegistry>) -> Self {
        self.limiters = Some(registry);
        self
    }

    /// Registers the scanner cache.
    #[must_use]
    pub fn scanner(mut self, scanner: Arc<trellis_db::ScannerCache>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Registers the file cache.
    #[must_use]
    pub fn file_cache(mut self, cache: Arc<FileCache>) -> Self {
        self.file_cache = Some(cache);
        self
    }

    /// Registers an external driver close hook (redis, mail, queue).
    /// Hooks run in registration order.
    #[must_use]
    pub fn driver<F, Fut>(mut self, name: impl Into<String>, close: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let hook: DriverHook = Box::new(move || {
            let fut: BoxFuture<'static, Result<(), anyhow::Error>> = Box::pin(close());
            fut
        });
        self.drivers.push((name.into(), hook));
        self
    }

    /// Registers the database handle.
    #[must_use]
    pub fn database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Runs the staged teardown. Failures are logged and never block
    /// subsequent steps.
    pub async fn run(self) {
        let deadline = self.deadline;

        if let Some((stop, tracker)) = self.http {
            stop.stop();
            match tokio::time::timeout(deadline, tracker.drained()).await {
                Ok(()) => tracing::info!("http: in-flight requests drained"),
                Err(_) => tracing::warn!(
                    remaining = tracker.active_connections(),
                    "http: drain deadline exceeded, continuing"
                ),
            }
        }

        if let Some(limiters) = self.limiters {
            limiters.stop_all();
            tracing::info!(count = limiters.len(), "rate limiter reapers stopped");
        }

        if let Some(scanner) = self.scanner {
            scanner.stop();
            tracing::info!("scanner cache reaper stopped");
        }

        if let Some(cache) = self.file_cache {
            cache.stop();
            tracing::info!("file cache garbage collector stopped");
        }

        for (name, close) in self.drivers {
            match tokio::time::timeout(deadline, close()).await {
                Ok(Ok(())) => tracing::info!(driver = %name, "driver closed"),
                Ok(Err(error)) => {
                    tracing::warn!(driver = %name, %error, "driver close failed, continuing");
                }
                Err(_) => {
                    tracing::warn!(driver = %name, "driver close deadline exceeded, continuing");
                }
            }
        }

        if let Some(database) = self.database {
            match tokio::time::timeout(deadline, database.close()).await {
                Ok(()) => tracing::info!("database pool closed"),
                Err(_) => tracing::warn!("database close deadline exceeded"),
            }
        }

        tracing::info!("teardown complete");
    }

    /// Waits for an OS signal, then runs the teardown.
    pub async fn run_on_signal(self) {
        wait_for_signal().await;
        self.run().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_counts_tokens() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_connections(), 0);

        let first = tracker.acquire();
        let second = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(first);
        assert_eq!(tracker.active_connections(), 1);
        drop(second);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_drained_resolves_immediately_when_idle() {
        let tracker = ConnectionTracker::new();
        tokio::time::timeout(Duration::from_millis(10), tracker.drained())
            .await
            .expect("drained() should resolve with no connections");
    }

    #[tokio::test]
    async fn test_drained_waits_for_tokens() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        let waiter = tracker.clone();
        let handle = tokio::spawn(async move { waiter.drained().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(token);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drained() should resolve")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_teardown_stops_registered_services() {
        let registry = LimiterRegistry::new();
        let limiter =
            trellis_middleware::RateLimiter::new(10, Duration::from_secs(60), &registry);
        let scanner = trellis_db::ScannerCache::new();

        let http_stop = StopSignal::new();
        let tracker = ConnectionTracker::new();

        Teardown::new()
            .deadline(Duration::from_millis(200))
            .http(http_stop.clone(), tracker)
            .limiters(registry)
            .scanner(scanner.clone())
            .run()
            .await;

        assert!(http_stop.is_stopped());
        assert!(limiter.is_stopped());
        assert!(scanner.is_stopped());
    }

    #[tokio::test]
    async fn test_teardown_driver_failure_does_not_block_later_steps() {
        let scanner = trellis_db::ScannerCache::new();

        Teardown::new()
            .deadline(Duration::from_millis(200))
            .driver("redis", || async { Err(anyhow::anyhow!("connection reset")) })
            .scanner(scanner.clone())
            .run()
            .await;

        // Driver hooks run after the scanner step, but an earlier
        // failure in any step still lets the rest complete.
        assert!(scanner.is_stopped());
    }

    #[tokio::test]
    async fn test_teardown_respects_drain_deadline() {
        let tracker = ConnectionTracker::new();
        let _held = tracker.acquire();

        let start = std::time::Instant::now();
        Teardown::new()
            .deadline(Duration::from_millis(50))
            .http(StopSignal::new(), tracker)
            .run()
            .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(5));
    }
}
