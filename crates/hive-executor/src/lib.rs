//! Executor side of the hive bridge.
//!
//! The executor connects back to the controller's WebSocket address, then
//! serves commands against an [`Engine`] until it receives `done` or the
//! channel closes. [`MemoryEngine`] is the built-in engine: it keeps page
//! state in memory and is what the `hive-executor` binary runs.

pub mod engine;
pub mod memory;
pub mod props;
pub mod registry;
pub mod router;

use hive_types::{HiveError, SessionId};

pub use engine::{Completion, CookieJar, Engine, EngineError, EnginePage, EventSink, PropertyTarget};
pub use memory::{MemoryEngine, MemoryPage};
pub use router::{Flow, Router};

/// Session id encoded in a connect address: its last path segment.
///
/// `ws://127.0.0.1:4123/hive-1` names session `hive-1`.
pub fn session_from_address(address: &str) -> Result<SessionId, HiveError> {
    let path = address
        .split_once("://")
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path)
        .unwrap_or_default();
    let segment = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if segment.is_empty() {
        return Err(HiveError::ConfigError(format!(
            "address '{address}' does not name a session"
        )));
    }
    Ok(SessionId::new(segment))
}

/// Connect to `address` and serve `engine` until the session ends.
pub async fn serve<E: Engine>(address: &str, engine: E) -> Result<(), HiveError> {
    let session = session_from_address(address)?;
    let endpoint = hive_channel::ws::connect(address).await?;
    tracing::info!(%session, %address, "connected to controller");
    Router::new(session, engine, endpoint.channel)
        .run(endpoint.inbound)
        .await
}
