//! Per-request accounting of rate-limit waits.

use parley_core::CompiledRoute;
use parley_error::{RestError, RestErrorKind};
use std::time::Duration;
use tracing::warn;

/// Total rate-limit wait one logical request may accumulate.
///
/// Every wait, whether on a bucket window or a server `retry_after`, is
/// charged before sleeping. A charge that would push the total past the
/// maximum fails instead.
///
/// # Example
///
/// ```
/// use parley_core::routes;
/// use parley_rate_limit::WaitBudget;
/// use std::time::Duration;
///
/// let route = routes::GET_MY_USER.compile(&[]).unwrap();
/// let mut budget = WaitBudget::new(Duration::from_secs(3));
///
/// assert!(budget.charge(Duration::from_secs(2), &route).is_ok());
/// assert!(budget.charge(Duration::from_secs(2), &route).is_err());
/// assert_eq!(budget.spent(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBudget {
    max: Duration,
    spent: Duration,
}

impl WaitBudget {
    /// Budget allowing up to `max` of total waiting.
    pub fn new(max: Duration) -> Self {
        Self {
            max,
            spent: Duration::ZERO,
        }
    }

    /// Waiting already charged.
    pub fn spent(&self) -> Duration {
        self.spent
    }

    /// Waiting still allowed.
    pub fn remaining(&self) -> Duration {
        self.max.saturating_sub(self.spent)
    }

    /// Charge a wait against the budget.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitTooLong` when the wait does not fit; nothing is charged.
    pub fn charge(&mut self, wait: Duration, route: &CompiledRoute) -> Result<(), RestError> {
        let total = self.spent.saturating_add(wait);
        if total > self.max {
            warn!(
                route = %route,
                wait_secs = wait.as_secs_f64(),
                spent_secs = self.spent.as_secs_f64(),
                "Rate limit wait exceeds budget"
            );
            return Err(RestError::new(RestErrorKind::RateLimitTooLong {
                route: route.to_string(),
                retry_after: wait.as_secs_f64(),
                max_rate_limit: self.max.as_secs_f64(),
            }));
        }
        self.spent = total;
        Ok(())
    }
}
