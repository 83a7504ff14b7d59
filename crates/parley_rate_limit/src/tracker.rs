//! Per-route rate-limit buckets.
//!
//! Buckets start out unknown and admit one request at a time. The first
//! response carrying rate-limit headers makes a bucket known, after which
//! requests are admitted while the window has calls left and suspended
//! until the window resets otherwise.
//!
//! When the server names the bucket a route belongs to (`X-RateLimit-Bucket`),
//! the route identity is mapped to that hash. Every route sharing the hash and
//! the same major parameters then shares one bucket.

use crate::{RateLimitConfig, RateLimitHeaders, WaitBudget};
use parking_lot::Mutex;
use parley_core::CompiledRoute;
use parley_error::RestError;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

#[derive(Debug)]
struct BucketState {
    limit: u32,
    remaining: u32,
    reset_at: Instant,
    window: Duration,
    is_unknown: bool,
    in_flight: bool,
    unlimited: bool,
    last_used: Instant,
}

#[derive(Debug)]
struct Bucket {
    /// Held by the request at the head of the queue while it waits; FIFO.
    gate: AsyncMutex<()>,
    state: Mutex<BucketState>,
    /// Signalled when an unknown bucket's in-flight request resolves.
    resolved: Notify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Unknown,
    Counted { window: Instant },
    Unlimited,
}

enum Admission {
    Proceed(PermitKind),
    AwaitResolution,
    SleepUntil(Instant),
}

impl Bucket {
    fn unknown(now: Instant) -> Self {
        Self {
            gate: AsyncMutex::new(()),
            state: Mutex::new(BucketState {
                limit: 1,
                remaining: 1,
                reset_at: now,
                window: Duration::ZERO,
                is_unknown: true,
                in_flight: false,
                unlimited: false,
                last_used: now,
            }),
            resolved: Notify::new(),
        }
    }

    fn admit(&self, now: Instant) -> Admission {
        let mut state = self.state.lock();
        state.last_used = now;

        if state.unlimited {
            return Admission::Proceed(PermitKind::Unlimited);
        }

        if state.is_unknown {
            if state.in_flight {
                return Admission::AwaitResolution;
            }
            state.in_flight = true;
            return Admission::Proceed(PermitKind::Unknown);
        }

        if now >= state.reset_at {
            state.remaining = state.limit.max(1);
            state.reset_at = now + state.window;
        }

        if state.remaining > 0 {
            state.remaining -= 1;
            Admission::Proceed(PermitKind::Counted {
                window: state.reset_at,
            })
        } else {
            Admission::SleepUntil(state.reset_at)
        }
    }

    fn apply(&self, headers: &RateLimitHeaders, now: Instant) {
        {
            let mut state = self.state.lock();
            let window = headers.reset_after();
            state.limit = headers.limit;
            state.remaining = headers.remaining;
            state.window = window;
            state.reset_at = now + window;
            state.is_unknown = false;
            state.unlimited = false;
            state.in_flight = false;
            state.last_used = now;
        }
        self.resolved.notify_one();
    }

    fn resolve_in_flight(&self) {
        self.state.lock().in_flight = false;
        self.resolved.notify_one();
    }
}

#[derive(Debug)]
struct TrackerInner {
    ttl: Duration,
    route_hashes: Mutex<HashMap<String, String>>,
    buckets: Mutex<HashMap<String, Arc<Bucket>>>,
}

impl TrackerInner {
    fn key_for(&self, route: &CompiledRoute) -> String {
        let identity = route.route_identity();
        match self.route_hashes.lock().get(&identity) {
            Some(hash) => route.bucket_key(hash),
            None => route.bucket_key(&format!("unknown:{}", identity)),
        }
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Bucket> {
        let bucket = self
            .buckets
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| {
                trace!(bucket = key, "Creating bucket");
                Arc::new(Bucket::unknown(now))
            })
            .clone();
        bucket.state.lock().last_used = now;
        bucket
    }

    fn sweep(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            // Held by a queued or admitted request.
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            let state = bucket.state.lock();
            let window_over = state.is_unknown || state.unlimited || now >= state.reset_at;
            let idle = now.saturating_duration_since(state.last_used) >= self.ttl;
            !(window_over && idle && !state.in_flight)
        });
        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, remaining = buckets.len(), "Evicted stale buckets");
        }
        removed
    }
}

/// Point-in-time view of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSnapshot {
    /// Bucket key
    pub key: String,
    /// Calls allowed per window
    pub limit: u32,
    /// Calls left in the current window
    pub remaining: u32,
    /// Time until the window resets
    pub reset_after: Duration,
    /// No response has populated the bucket yet
    pub is_unknown: bool,
    /// The server reported no limit for this bucket
    pub unlimited: bool,
}

/// Tracks rate-limit buckets for every route the client has called.
///
/// Distinct bucket keys never block each other. Requests for the same key
/// are admitted in submission order.
///
/// # Example
///
/// ```
/// use parley_core::routes;
/// use parley_rate_limit::{RouteBucketTracker, WaitBudget};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), parley_error::RestError> {
/// let tracker = RouteBucketTracker::new(Duration::from_secs(600));
/// let route = routes::GET_CHANNEL.compile(&[("channel", &1u64)]).unwrap();
///
/// let mut budget = WaitBudget::new(Duration::from_secs(60));
/// let permit = tracker.acquire(&route, &mut budget).await?;
/// // ... perform the request, then resolve the permit from its response
/// permit.release();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RouteBucketTracker {
    inner: Arc<TrackerInner>,
    gc: Mutex<Option<JoinHandle<()>>>,
}

impl RouteBucketTracker {
    /// Create a tracker evicting expired buckets idle for longer than `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ttl,
                route_hashes: Mutex::new(HashMap::new()),
                buckets: Mutex::new(HashMap::new()),
            }),
            gc: Mutex::new(None),
        }
    }

    /// Create a tracker from configuration and start its eviction sweep.
    ///
    /// The sweep only starts when called inside a Tokio runtime.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let tracker = Self::new(config.bucket_ttl());
        tracker.spawn_gc(config.bucket_gc_interval());
        tracker
    }

    /// Wait until the route's bucket admits one more request.
    ///
    /// Time spent waiting for a window to reset is charged to `budget`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitTooLong` when the wait would exceed the budget.
    #[instrument(skip(self, route, budget), fields(route = %route))]
    pub async fn acquire(
        &self,
        route: &CompiledRoute,
        budget: &mut WaitBudget,
    ) -> Result<BucketPermit, RestError> {
        'resolve: loop {
            let key = self.inner.key_for(route);
            let bucket = self.inner.bucket(&key, Instant::now());
            let _gate = bucket.gate.lock().await;

            loop {
                if self.inner.key_for(route) != key {
                    debug!(bucket = %key, "Bucket remapped while queued");
                    continue 'resolve;
                }

                let now = Instant::now();
                match bucket.admit(now) {
                    Admission::Proceed(kind) => {
                        trace!(bucket = %key, ?kind, "Admitted");
                        return Ok(BucketPermit {
                            inner: Arc::clone(&self.inner),
                            bucket: Arc::clone(&bucket),
                            route: route.clone(),
                            key,
                            kind,
                            resolved: false,
                        });
                    }
                    Admission::AwaitResolution => {
                        debug!(bucket = %key, "Unknown bucket busy, waiting for in-flight request");
                        bucket.resolved.notified().await;
                    }
                    Admission::SleepUntil(reset_at) => {
                        let wait = reset_at.saturating_duration_since(now);
                        budget.charge(wait, route)?;
                        warn!(
                            bucket = %key,
                            wait_ms = wait.as_millis() as u64,
                            "Bucket exhausted, waiting for window reset"
                        );
                        tokio::time::sleep_until(reset_at).await;
                    }
                }
            }
        }
    }

    /// Remove buckets whose window is over and which have been idle past the TTL.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self, now: Instant) -> usize {
        self.inner.sweep(now)
    }

    /// Start a background task calling [`sweep`](Self::sweep) every `interval`.
    ///
    /// The task stops on [`close`](Self::close) or when the tracker is dropped.
    /// Outside a Tokio runtime this logs a warning and does nothing.
    pub fn spawn_gc(&self, interval: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No Tokio runtime, bucket eviction disabled");
            return;
        };

        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.sweep(Instant::now());
            }
        });

        if let Some(previous) = self.gc.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background sweep.
    pub fn close(&self) {
        if let Some(handle) = self.gc.lock().take() {
            debug!("Stopping bucket eviction");
            handle.abort();
        }
    }

    /// Number of tracked buckets.
    pub fn len(&self) -> usize {
        self.inner.buckets.lock().len()
    }

    /// No buckets are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket key a route currently resolves to.
    pub fn bucket_key(&self, route: &CompiledRoute) -> String {
        self.inner.key_for(route)
    }

    /// Current state of the bucket a route resolves to, if it exists.
    pub fn snapshot(&self, route: &CompiledRoute) -> Option<BucketSnapshot> {
        let key = self.inner.key_for(route);
        let bucket = self.inner.buckets.lock().get(&key).cloned()?;
        let state = bucket.state.lock();
        Some(BucketSnapshot {
            limit: state.limit,
            remaining: state.remaining,
            reset_after: state.reset_at.saturating_duration_since(Instant::now()),
            is_unknown: state.is_unknown,
            unlimited: state.unlimited,
            key,
        })
    }
}

impl Drop for RouteBucketTracker {
    fn drop(&mut self) {
        self.close();
    }
}

/// Admission to one request against a bucket.
///
/// Resolve it with [`update`](Self::update) once a response with rate-limit
/// headers arrives, with [`mark_unlimited`](Self::mark_unlimited) after a
/// successful response without them, or with [`release`](Self::release) when
/// no response is available. Dropping an unresolved permit releases it.
#[derive(Debug)]
pub struct BucketPermit {
    inner: Arc<TrackerInner>,
    bucket: Arc<Bucket>,
    route: CompiledRoute,
    key: String,
    kind: PermitKind,
    resolved: bool,
}

impl BucketPermit {
    /// Key of the bucket this permit was admitted under.
    pub fn bucket_key(&self) -> &str {
        &self.key
    }

    /// Overwrite bucket state with the server's authoritative values.
    ///
    /// A bucket hash the route was not yet mapped to remaps the route, and
    /// the values are applied to the bucket under the new key.
    pub fn update(mut self, headers: &RateLimitHeaders) {
        self.resolved = true;
        let now = Instant::now();

        let target = match &headers.bucket {
            Some(hash) => {
                let identity = self.route.route_identity();
                let previous = self
                    .inner
                    .route_hashes
                    .lock()
                    .insert(identity, hash.clone());
                if previous.as_deref() != Some(hash.as_str()) {
                    debug!(route = %self.route, bucket_hash = %hash, "Discovered bucket hash");
                }
                self.route.bucket_key(hash)
            }
            None => self.key.clone(),
        };

        let bucket = if target == self.key {
            Arc::clone(&self.bucket)
        } else {
            self.inner.bucket(&target, now)
        };

        trace!(
            bucket = %target,
            limit = headers.limit,
            remaining = headers.remaining,
            reset_after = headers.reset_after,
            "Updating bucket"
        );
        bucket.apply(headers, now);

        if !Arc::ptr_eq(&bucket, &self.bucket) {
            self.bucket.resolve_in_flight();
        }
    }

    /// The server sent no rate-limit headers on a successful response.
    ///
    /// An unknown bucket stops serializing requests. A known bucket keeps
    /// its state.
    pub fn mark_unlimited(mut self) {
        self.resolved = true;
        {
            let mut state = self.bucket.state.lock();
            if state.is_unknown {
                debug!(bucket = %self.key, "No rate-limit headers, bucket is unlimited");
                state.is_unknown = false;
                state.unlimited = true;
            }
            state.in_flight = false;
        }
        self.bucket.resolved.notify_one();
    }

    /// Resolve without response information, undoing the admission.
    pub fn release(mut self) {
        self.resolved = true;
        self.rollback();
    }

    fn rollback(&self) {
        match self.kind {
            PermitKind::Unknown => self.bucket.resolve_in_flight(),
            PermitKind::Counted { window } => {
                let mut state = self.bucket.state.lock();
                if !state.is_unknown && state.reset_at == window && state.remaining < state.limit {
                    state.remaining += 1;
                    trace!(bucket = %self.key, remaining = state.remaining, "Rolled back admission");
                }
            }
            PermitKind::Unlimited => {}
        }
    }
}

impl Drop for BucketPermit {
    fn drop(&mut self) {
        if !self.resolved {
            self.rollback();
        }
    }
}
