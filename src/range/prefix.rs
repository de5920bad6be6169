//! Hash prefix validation.
//!
//! A [`PrefixKey`] can only be obtained through [`PrefixKey::parse`], so every
//! value that reaches the cache or the upstream provider is a canonical
//! 5-character uppercase hex string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::range::error::InvalidPrefix;

/// Number of hex characters clients reveal of their hash.
pub const PREFIX_LEN: usize = 5;

/// A validated, uppercase 5-character hex prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrefixKey(String);

impl PrefixKey {
    /// Validate and canonicalize a candidate prefix.
    pub fn parse(input: &str) -> Result<Self, InvalidPrefix> {
        if input.len() != PREFIX_LEN || !input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidPrefix);
        }
        Ok(Self(input.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`PrefixKey::parse`].
pub fn validate(input: &str) -> Result<PrefixKey, InvalidPrefix> {
    PrefixKey::parse(input)
}

impl fmt::Display for PrefixKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PrefixKey {
    type Err = InvalidPrefix;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrefixKey {
    type Error = InvalidPrefix;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrefixKey> for String {
    fn from(key: PrefixKey) -> Self {
        key.0
    }
}
