//! Controller side of the hive bridge.
//!
//! A [`Session`] owns one executor process and the WebSocket channel it
//! connects back on. Pages created through the session share that channel;
//! every entity correlates its own requests through a [`Bridge`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), hive_types::HiveError> {
//! let config = hive_types::BridgeConfig::default();
//! hive_bridge::listen(&config, |session| async move {
//!     let page = session.create_page().await?;
//!     let status = page.open("http://example.com").await?;
//!     let title = page.evaluate("function () { return document.title; }", vec![]).await?;
//!     println!("{status}: {title}");
//!     Ok::<_, hive_types::HiveError>(())
//! })
//! .await??;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod correlator;
pub mod events;
pub mod listener;
pub mod page;
pub mod registry;
mod reply;
mod router;
pub mod session;
pub mod supervisor;

use std::future::Future;

use hive_types::{BridgeConfig, HiveError};

pub use bridge::{Bridge, PendingReply};
pub use correlator::Correlator;
pub use events::Event;
pub use page::Page;
pub use session::Session;
pub use supervisor::{install_shutdown_hook, shutdown_all, ProcessHandle, ShutdownGuard};

/// Launch a session and hand it to `ready` once the executor has connected.
///
/// When `ready` completes the session is exited if it is still alive, and
/// `ready`'s output is returned.
pub async fn listen<F, Fut, T>(config: &BridgeConfig, ready: F) -> Result<T, HiveError>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = T>,
{
    let session = Session::launch(config).await?;
    let output = ready(session.clone()).await;
    if session.is_alive() {
        if let Err(e) = session.exit().await {
            tracing::warn!(session = %session.id(), error = %e, "session exit failed");
        }
    }
    Ok(output)
}
