//! Per-session WebSocket listener.
//!
//! Each session binds its own listener and serves exactly one route,
//! `/{session}`. The first upgrade on that route becomes the session's
//! channel; later attempts are refused with `409 Conflict` and other paths
//! with `404 Not Found`.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use hive_channel::{ws, Endpoint};
use hive_types::{HiveError, ListenConfig, SessionId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct ListenerState {
    session: SessionId,
    slot: Arc<Mutex<Option<oneshot::Sender<Endpoint>>>>,
}

/// A bound listener waiting for (or serving) one executor connection.
///
/// The HTTP server runs until this value is dropped.
#[derive(Debug)]
pub struct SessionListener {
    session: SessionId,
    local_addr: SocketAddr,
    connect_host: String,
    incoming: Option<oneshot::Receiver<Endpoint>>,
    server: JoinHandle<()>,
}

impl SessionListener {
    pub async fn bind(config: &ListenConfig, session: SessionId) -> Result<Self, HiveError> {
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                HiveError::Transport(format!(
                    "listener bind failed on {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HiveError::Transport(format!("listener address unavailable: {e}")))?;

        let (tx, rx) = oneshot::channel();
        let state = ListenerState {
            session: session.clone(),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Router::new()
            .route("/{session}", get(upgrade))
            .with_state(state);

        let server_session = session.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(session = %server_session, error = %e, "session listener stopped");
            }
        });

        info!(session = %session, addr = %local_addr, "session listener bound");

        Ok(Self {
            connect_host: connect_host(config, local_addr),
            session,
            local_addr,
            incoming: Some(rx),
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address handed to the executor: `ws://<host>:<port>/<session>`.
    pub fn address(&self) -> String {
        format!(
            "ws://{}:{}/{}",
            self.connect_host,
            self.local_addr.port(),
            self.session
        )
    }

    /// Wait for the executor to connect.
    ///
    /// Can be awaited once; afterwards the listener only rejects.
    pub async fn accept(&mut self) -> Result<Endpoint, HiveError> {
        let incoming = self
            .incoming
            .take()
            .ok_or_else(|| HiveError::Transport("session connection already accepted".into()))?;
        incoming.await.map_err(|_| {
            HiveError::Transport("listener stopped before the executor connected".into())
        })
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Host the executor should dial. Wildcard binds are reached over loopback.
fn connect_host(config: &ListenConfig, local_addr: SocketAddr) -> String {
    match config.host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => match local_addr {
            SocketAddr::V4(_) => "127.0.0.1".to_string(),
            SocketAddr::V6(_) => "[::1]".to_string(),
        },
        Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
        _ => config.host.clone(),
    }
}

async fn upgrade(
    State(state): State<ListenerState>,
    Path(session): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if state.session != session.as_str() {
        debug!(expected = %state.session, requested = %session, "connection for unknown session");
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(tx) = state.slot.lock().unwrap_or_else(|e| e.into_inner()).take() else {
        warn!(session = %state.session, "rejecting second connection for session");
        return StatusCode::CONFLICT.into_response();
    };
    let session = state.session.clone();
    ws.on_upgrade(move |socket| async move {
        info!(session = %session, "executor connected");
        let _ = tx.send(ws::attach(socket));
    })
}
