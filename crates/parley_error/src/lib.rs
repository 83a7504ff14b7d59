//! Error types for the Parley library.
//!
//! This crate provides the foundation error types used throughout the Parley workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern for clean error handling:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use parley_error::{ParleyResult, RestError, RestErrorKind};
//!
//! fn fetch_channel() -> ParleyResult<String> {
//!     Err(RestError::new(RestErrorKind::Transport {
//!         route: "GET /channels/{channel}".to_string(),
//!         message: "connection reset".to_string(),
//!     }))?
//! }
//!
//! match fetch_channel() {
//!     Ok(data) => println!("Got: {}", data),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;
mod rest;
mod route;

pub use builder::{BuilderError, BuilderErrorKind};
pub use config::{ConfigError, ConfigErrorKind};
pub use error::{ParleyError, ParleyErrorKind, ParleyResult};
pub use rest::{BODY_SNIPPET_LIMIT, RestError, RestErrorKind, RestResult, body_snippet};
pub use route::{RouteError, RouteErrorKind};
