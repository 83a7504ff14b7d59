//! Process-wide request gate.

use crate::{RateLimitConfig, WaitBudget};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use parking_lot::Mutex;
use parley_core::CompiledRoute;
use parley_error::RestError;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gate applied to every authenticated request regardless of route.
///
/// After the server reports a global limit breach, [`throttle`](Self::throttle)
/// closes the gate until the reported time has passed. An optional
/// requests-per-second cap (GCRA via governor) is applied after the gate opens.
///
/// Waiters are released in no particular order.
///
/// # Example
///
/// ```
/// use parley_rate_limit::GlobalThrottle;
///
/// let throttle = GlobalThrottle::new(0);
/// throttle.throttle(2.0);
/// throttle.throttle(1.0); // never shortens the current wait
/// assert!(throttle.is_throttled());
/// ```
pub struct GlobalThrottle {
    available_at: Mutex<Option<Instant>>,
    limiter: Option<DirectRateLimiter>,
}

impl std::fmt::Debug for GlobalThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalThrottle")
            .field("available_at", &self.available_at())
            .field("rate_capped", &self.limiter.is_some())
            .finish()
    }
}

impl GlobalThrottle {
    /// Create a throttle capping requests at `requests_per_second`; 0 disables the cap.
    pub fn new(requests_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(requests_per_second)
            .map(|rps| GovernorRateLimiter::direct(Quota::per_second(rps)));
        Self {
            available_at: Mutex::new(None),
            limiter,
        }
    }

    /// Create a throttle from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(*config.global_requests_per_second())
    }

    /// Wait until the gate is open and the rate cap admits one request.
    ///
    /// Time spent behind a closed gate is charged to `budget` before sleeping.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitTooLong` when the remaining closure does not fit the budget.
    pub async fn acquire(
        &self,
        route: &CompiledRoute,
        budget: &mut WaitBudget,
    ) -> Result<(), RestError> {
        loop {
            let until = *self.available_at.lock();
            let now = Instant::now();
            match until {
                Some(until) if until > now => {
                    let wait = until.saturating_duration_since(now);
                    budget.charge(wait, route)?;
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        "Waiting for global rate limit"
                    );
                    // The deadline may be pushed back while sleeping.
                    tokio::time::sleep_until(until).await;
                }
                _ => break,
            }
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        Ok(())
    }

    /// Close the gate for `seconds` from now.
    ///
    /// Only ever extends the current closure.
    pub fn throttle(&self, seconds: f64) {
        let wait = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
        let until = Instant::now() + wait;
        let mut available_at = self.available_at.lock();
        if available_at.is_none_or(|current| until > current) {
            error!(retry_after = seconds, "Hit global rate limit");
            *available_at = Some(until);
        }
    }

    /// The gate is currently closed.
    pub fn is_throttled(&self) -> bool {
        self.available_at
            .lock()
            .is_some_and(|until| until > Instant::now())
    }

    /// When the gate opens, if a breach has been reported.
    pub fn available_at(&self) -> Option<Instant> {
        *self.available_at.lock()
    }

    /// Open the gate immediately.
    pub fn reset(&self) {
        *self.available_at.lock() = None;
    }
}
