use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix shared by every grid capability string
pub const CAPABILITY_PREFIX: &str = "URI:";

/// An opaque grid capability
///
/// Names an object and, for read capabilities, grants access to it.
/// Immutable objects are content-addressed, so equal bytes always yield an
/// equal capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(cap: impl Into<String>) -> Self {
        Self(cap.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether a string looks like a capability rather than a literal
    pub fn looks_like_capability(s: &str) -> bool {
        s.starts_with(CAPABILITY_PREFIX)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("empty capability string")]
pub struct EmptyCapability;

impl FromStr for Capability {
    type Err = EmptyCapability;

    /// Trims surrounding whitespace, as grids terminate capabilities with a newline
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EmptyCapability);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<String> for Capability {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
