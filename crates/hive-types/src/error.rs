//! Error types shared across all hive crates.

use std::time::Duration;

use crate::ids::EntityId;

/// Errors that can occur across the bridge.
///
/// Controller-side calls resolve with one of these instead of a result when
/// the request cannot complete: the channel went away, the executor reported
/// a fault, or the configured timeout elapsed.
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("page {0} is closed")]
    EntityClosed(EntityId),

    #[error("command '{command}' timed out after {duration:?}")]
    Timeout { command: String, duration: Duration },

    #[error("executor reported failure for '{command}': {message}")]
    Remote { command: String, message: String },

    #[error("duplicate page id {0}")]
    DuplicateEntity(EntityId),

    #[error("correlation id {0} is already pending")]
    DuplicateCorrelation(i64),

    #[error("unexpected reply to '{command}': {detail}")]
    UnexpectedReply { command: String, detail: String },

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("failed to spawn executor: {0}")]
    Spawn(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl HiveError {
    /// Build an [`HiveError::UnexpectedReply`] for a reply that did not have
    /// the shape the typed wrapper expected.
    pub fn unexpected(command: &str, detail: impl Into<String>) -> Self {
        HiveError::UnexpectedReply {
            command: command.to_string(),
            detail: detail.into(),
        }
    }
}
