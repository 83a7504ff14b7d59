//! Rate-limit bookkeeping for the Parley REST client.
//!
//! Two independent gates stand between a request and the network:
//!
//! - [`RouteBucketTracker`] keeps one bucket per rate-limit scope learned
//!   from response headers and suspends callers until their bucket has room.
//! - [`GlobalThrottle`] holds every authenticated request back after the
//!   platform reports a global limit breach, and optionally caps the request
//!   rate proactively.
//!
//! Configuration for the whole client lives here as well, see [`ParleyConfig`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod budget;
mod config;
mod global;
mod headers;
mod tracker;

pub use budget::WaitBudget;
pub use config::{ParleyConfig, RateLimitConfig, RestConfig};
pub use global::GlobalThrottle;
pub use headers::{RateLimitHeaders, parse_retry_after};
pub use tracker::{BucketPermit, BucketSnapshot, RouteBucketTracker};
