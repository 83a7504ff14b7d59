//! Rate-limited REST request pipeline for the Parley chat platform client.
//!
//! A request passes through these stages on every attempt:
//!
//! 1. The route's bucket in [`RouteBucketTracker`](parley_rate_limit::RouteBucketTracker) admits it.
//! 2. The [`GlobalThrottle`](parley_rate_limit::GlobalThrottle) admits it (authenticated requests only).
//! 3. A [`TokenStrategy`] supplies the `Authorization` header.
//! 4. The [`Transport`] performs the HTTP call.
//! 5. Response headers update the bucket and [`classify`] decides the outcome.
//!
//! [`RestExecutor`] runs this loop, recovering from rate limits, transient
//! failures and one rejected credential. [`RestClient`] wraps it with typed
//! endpoint methods.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod client;
mod credentials;
mod executor;
mod request;
mod transport;

pub use classifier::{RateLimitScope, RequestOutcome, classify};
pub use client::{RestClient, RestClientBuilder};
pub use credentials::{
    ClientCredentialsStrategy, CredentialCache, CredentialState, DEFAULT_CLIENT_CREDENTIALS_SCOPES,
    StaticToken, TokenIssuer, TokenStrategy, TokenType,
};
pub use executor::RestExecutor;
pub use request::{RestRequest, RestRequestBuilder};
pub use transport::{
    ReqwestTransport, RequestBody, Transport, TransportError, TransportRequest, TransportResponse,
};
