//! Core type definitions for txgraph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A logical timestamp issued by the oracle.
///
/// Zero is reserved: on the wire it means "allocate a fresh one".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The reserved "allocate for me" value.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp.
    #[must_use]
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true for the reserved zero timestamp.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a graph node.
///
/// Rendered as lowercase hex with a `0x` prefix, the way clients see it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Uid(pub u64);

impl Uid {
    /// Creates a uid.
    #[must_use]
    pub const fn new(uid: u64) -> Self {
        Self(uid)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Error returned when a uid literal cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid uid {0:?}")]
pub struct ParseUidError(pub String);

impl FromStr for Uid {
    type Err = ParseUidError;

    /// Accepts `0x`-prefixed hex or plain decimal. Zero is not a valid uid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse::<u64>(),
        };
        match parsed {
            Ok(0) | Err(_) => Err(ParseUidError(s.to_string())),
            Ok(raw) => Ok(Uid(raw)),
        }
    }
}

/// An opaque conflict key naming one (node, predicate) cell.
///
/// Clients receive keys from mutate and hand them back on commit, so the
/// textual form is part of the protocol. Equality is exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Wraps a key received from a client.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds the key for `predicate` on `uid`.
    #[must_use]
    pub fn for_attr(uid: Uid, predicate: &str) -> Self {
        Self(format!("{uid}|{predicate}"))
    }

    /// Returns the textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp::new(1) < Timestamp::new(2));
        assert!(Timestamp::ZERO.is_zero());
        assert_eq!(Timestamp::new(7).to_string(), "7");
    }

    #[test]
    fn uid_display_and_parse() {
        let uid = Uid::new(0x2a);
        assert_eq!(uid.to_string(), "0x2a");
        assert_eq!("0x2a".parse::<Uid>().unwrap(), uid);
        assert_eq!("42".parse::<Uid>().unwrap(), uid);
        assert!("0x0".parse::<Uid>().is_err());
        let err = "bob".parse::<Uid>().unwrap_err();
        assert_eq!(err.to_string(), "invalid uid \"bob\"");
        let source: &dyn std::error::Error = &err;
        assert!(source.source().is_none());
    }

    #[test]
    fn key_names_node_and_predicate() {
        let key = Key::for_attr(Uid::new(1), "name");
        assert_eq!(key.as_str(), "0x1|name");
        assert_eq!(key, Key::new("0x1|name"));
        assert_ne!(key, Key::for_attr(Uid::new(1), "balance"));
    }
}
