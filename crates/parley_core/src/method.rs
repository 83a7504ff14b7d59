//! HTTP methods used by the platform API.

use serde::{Deserialize, Serialize};

/// HTTP method of a route.
///
/// # Examples
///
/// ```
/// use parley_core::HttpMethod;
/// use std::str::FromStr;
///
/// assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
/// assert_eq!(HttpMethod::from_str("DELETE").unwrap(), HttpMethod::Delete);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}
