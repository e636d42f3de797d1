use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a configured controller: its display name, or `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControllerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ControllerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ControllerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
