use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of an authenticated user, `provider:id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(provider: &str, id: impl fmt::Display) -> Self {
        Self(format!("{provider}:{id}"))
    }

    /// Accepts exactly one `:` with a non-empty provider and id on either side.
    pub fn parse(raw: &str) -> Option<Self> {
        let (provider, id) = raw.split_once(':')?;
        if provider.trim().is_empty() || id.trim().is_empty() || id.contains(':') {
            return None;
        }
        Some(Self(raw.to_owned()))
    }

    pub fn provider(&self) -> &str {
        self.0.split_once(':').map_or("", |(provider, _)| provider)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-assigned address of one live client. Opaque to everything but the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
