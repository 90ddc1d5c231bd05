//! Strongly-typed identifier wrappers to prevent accidental misuse of
//! strings and integers that travel in the same envelope.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Process-wide session counter. Session ids look like `hive-1`, `hive-2`.
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifier of a session (one executor process, one physical channel).
///
/// Uses `Arc<str>` internally so cloning is an atomic increment instead of a
/// heap allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Create a session id from any string-like value.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Allocate the next process-unique session id.
    pub fn next() -> Self {
        let n = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self::new(format!("hive-{n}"))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for SessionId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SessionId::new(s))
    }
}

/// Identifier of a page (sub-entity) within one session.
///
/// Allocated by the executor, starting at 1. Zero never names a live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id pairing a request with its response.
///
/// [`CorrelationId::EVENT`] (`-1`) marks an unsolicited event and is never
/// matched against a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub i64);

impl CorrelationId {
    /// Sentinel carried by unsolicited events.
    pub const EVENT: CorrelationId = CorrelationId(-1);

    /// Whether this id is the event sentinel.
    pub fn is_event(self) -> bool {
        self == Self::EVENT
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
