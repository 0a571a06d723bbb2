use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a physical ingestion host, as reported by the transport layer.
///
/// Hosts order lexicographically; rebalance tie-breaks rely on that order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostAddress(String);

impl HostAddress {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostAddress({})", self.0)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for HostAddress {
    fn borrow(&self) -> &str {
        &self.0
    }
}
