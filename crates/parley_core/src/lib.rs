//! Core routing and data types for the Parley chat platform client.
//!
//! This crate provides the route templates every REST call is compiled from,
//! the small wire models the client decodes itself, and tracing setup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod method;
mod models;
mod route;
pub mod routes;
mod snowflake;
mod telemetry;

pub use method::HttpMethod;
pub use models::{GatewayBot, OAuth2Token, SessionStartLimit};
pub use route::{CompiledRoute, MAJOR_PARAMETERS, Route};
pub use snowflake::Snowflake;
pub use telemetry::init_tracing;
#[cfg(feature = "otel")]
pub use telemetry::{init_telemetry, shutdown_telemetry};
