//! Token-bucket rate limiting.
//!
//! Each caller (authenticated subject, else client IP) owns a bucket
//! holding up to `capacity` tokens which refill continuously at
//! `capacity / window` tokens per second. Admission takes one token;
//! an empty bucket rejects with `Retry-After`.
//!
//! Buckets for idle callers are reclaimed by a background reaper that
//! deletes any bucket untouched for twice the window. Every limiter
//! registers itself in a [`LimiterRegistry`] so shutdown can stop all
//! reapers deterministically.
//!
//! # Example
//!
//! ```no_run
//! use trellis_middleware::{LimiterRegistry, RateLimit, RateLimiter};
//! use std::time::Duration;
//!
//! # async fn setup() {
//! let registry = LimiterRegistry::new();
//! let limiter = RateLimiter::new(100, Duration::from_secs(60), &registry);
//! let middleware = RateLimit::new(limiter);
//! // router.middleware(middleware);
//! # }
//! ```

use http::HeaderValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use trellis_core::{BoxFuture, Error, Middleware, Next, Request, RequestExt, Response, StopSignal};

/// How often the bucket reaper sweeps.
const REAPER_INTERVAL: Duration = Duration::from_secs(600);

/// One caller's token bucket.
#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// The outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Whole tokens left in the bucket after this admission.
    pub remaining: u64,
    /// How long until one token accrues, when rejected.
    pub retry_after: Duration,
}

/// A per-key token-bucket rate limiter with background reclamation.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    capacity: u64,
    window: Duration,
    refill_rate: f64,
    stop: StopSignal,
}

impl RateLimiter {
    /// Creates a limiter admitting `capacity` requests per `window`,
    /// spawns its bucket reaper, and registers it with `registry`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(capacity: u64, window: Duration, registry: &LimiterRegistry) -> Arc<Self> {
        let limiter = Arc::new(Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            window,
            refill_rate: capacity as f64 / window.as_secs_f64(),
            stop: StopSignal::new(),
        });
        limiter.spawn_reaper();
        registry.register(Arc::clone(&limiter));
        limiter
    }

    fn spawn_reaper(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, "rate limiter reclaimed idle buckets");
                        }
                    }
                    () = limiter.stop.stopped() => break,
                }
            }
            tracing::debug!("rate limiter reaper stopped");
        });
    }

    /// Attempts to admit one request for `key`.
    ///
    /// Refills the bucket for the elapsed time, caps it at capacity,
    /// then takes a token if one is available.
    pub fn check(&self, key: &str) -> Admission {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity as f64,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission {
                allowed: true,
                remaining: bucket.tokens.floor() as u64,
                retry_after: Duration::ZERO,
            }
        } else {
            Admission {
                allowed: false,
                remaining: 0,
                retry_after: Duration::from_secs((1.0 / self.refill_rate).ceil() as u64),
            }
        }
    }

    /// Deletes buckets whose last refill is older than `2 * window`.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        let idle_max = self.window * 2;
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) <= idle_max);
        before - buckets.len()
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

    /// Maximum admissions per window.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The accrual window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of live buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Process-wide registry of rate limiters, held by the shutdown
/// coordinator so every reaper is provably stopped at teardown.
#[derive(Default)]
pub struct LimiterRegistry {
    limiters: Mutex<Vec<Arc<RateLimiter>>>,
}

impl LimiterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, limiter: Arc<RateLimiter>) {
        self.limiters.lock().push(limiter);
    }

    /// Stops every registered limiter's reaper.
    pub fn stop_all(&self) {
        for limiter in self.limiters.lock().iter() {
            limiter.stop();
        }
    }

    /// Number of registered limiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    /// Returns `true` if no limiters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.lock().is_empty()
    }
}

/// Middleware enforcing a [`RateLimiter`] per request.
///
/// The limiting key is the authenticated subject when present,
/// otherwise the client IP. Admitted responses carry
/// `X-RateLimit-Limit`, `X-RateLimit-Remaining`, and
/// `X-RateLimit-Reset`; rejections answer 429 with `Retry-After`.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    /// Creates the middleware around a shared limiter.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    fn key_for(request: &Request) -> String {
        if let Some(user_id) = request.auth_user_id() {
            return format!("user:{user_id}");
        }
        request
            .client_ip()
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn annotate(&self, response: &mut Response, remaining: u64) {
        let reset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + self.limiter.window().as_secs();

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.limiter.capacity().to_string()) {
            headers.insert("x-ratelimit-limit", value);
        }
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            headers.insert("x-ratelimit-remaining", value);
        }
        if let Ok(value) = HeaderValue::from_str(&reset.to_string()) {
            headers.insert("x-ratelimit-reset", value);
        }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let key = Self::key_for(&request);
            let admission = self.limiter.check(&key);

            if !admission.allowed {
                let retry_secs = admission.retry_after.as_secs();
                tracing::warn!(%key, retry_after_secs = retry_secs, "rate limit exceeded");
                let mut response = Error::rate_limited(
                    format!("rate limit exceeded, retry in {retry_secs}s"),
                    retry_secs,
                )
                .into_response();
                self.annotate(&mut response, 0);
                return response;
            }

            let mut response = next.run(request).await;
            self.annotate(&mut response, admission.remaining);
            response
        })
    }
}
