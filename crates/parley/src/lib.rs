//! Parley - rate-limited REST client for the Parley chat platform
//!
//! Every call goes through a pipeline that respects the platform's per-route
//! buckets and its global limit, refreshes rejected credentials once, and
//! retries transient server and network failures with backoff. Callers see
//! either the decoded response or one typed error.
//!
//! # Quick Start
//!
//! ```no_run
//! use parley::{ParleyConfig, RestClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     parley::init_tracing()?;
//!
//!     let client = RestClient::builder()
//!         .config(ParleyConfig::load()?)
//!         .bot_token(std::env::var("PARLEY_BOT_TOKEN")?)
//!         .build()?;
//!
//!     let gateway = client.fetch_gateway_bot().await?;
//!     println!("{} shards recommended", gateway.shards());
//!
//!     client
//!         .create_message(123456789u64, json!({"content": "hello"}))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `parley_error` - Error types
//! - `parley_core` - Routes, snowflakes, wire models, tracing setup
//! - `parley_rate_limit` - Configuration, bucket tracker, global throttle
//! - `parley_rest` - Credentials, transport, classifier, executor, client
//!
//! This crate re-exports everything for convenience.
//!
//! # Cargo Features
//!
//! - `otel` - Export spans through OpenTelemetry

#![forbid(unsafe_code)]

pub use parley_core::*;
pub use parley_error::*;
pub use parley_rate_limit::*;
pub use parley_rest::*;
