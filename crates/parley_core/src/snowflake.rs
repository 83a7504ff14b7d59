//! Platform object identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// A 64-bit object ID.
///
/// The platform sends IDs as JSON strings; both strings and integers are
/// accepted when decoding.
///
/// # Examples
///
/// ```
/// use parley_core::Snowflake;
///
/// let id: Snowflake = serde_json::from_str("\"175928847299117063\"").unwrap();
/// assert_eq!(id.get(), 175928847299117063);
/// assert_eq!(id.to_string(), "175928847299117063");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::Display,
    derive_more::From,
)]
#[display("{}", _0)]
pub struct Snowflake(u64);

/// Milliseconds since the Unix epoch of the platform epoch (2015-01-01).
const PLATFORM_EPOCH_MS: u64 = 1_420_070_400_000;

impl Snowflake {
    /// Wrap a raw ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw integer value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_at_ms(&self) -> u64 {
        (self.0 >> 22) + PLATFORM_EPOCH_MS
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(number) => Ok(Self(number)),
        }
    }
}
