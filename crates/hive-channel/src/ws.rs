//! WebSocket transports carrying one JSON envelope per text frame.
//!
//! Both sides split the socket into a reader task and a writer task. The
//! writer drains the outbound queue until every [`Channel`] clone is dropped
//! and then closes the socket; the reader decodes frames into the inbound
//! queue until the remote closes. Frames that fail to decode are logged and
//! dropped, never answered.

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use hive_types::{Envelope, HiveError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::channel::{Channel, Endpoint};

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Dial a controller and return the connected endpoint.
///
/// `url` is the full address including the session path, e.g.
/// `ws://127.0.0.1:18080/hive-1`.
pub async fn connect(url: &str) -> Result<Endpoint, HiveError> {
    tracing::info!(url, "connecting to controller");

    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| HiveError::Transport(format!("failed to connect to {url}: {e}")))?;

    let (mut sink, mut stream) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let Some(text) = encode_frame(&envelope) else {
                continue;
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                tracing::warn!(error = %e, "WebSocket write failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(t)) => t.to_string(),
                Ok(Message::Binary(b)) => match String::from_utf8(b.to_vec()) {
                    Ok(s) => s,
                    Err(_) => {
                        tracing::warn!("dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("WebSocket closed by controller");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };
            if let Some(envelope) = decode_frame(&text) {
                if in_tx.send(envelope).is_err() {
                    break;
                }
            }
        }
    });

    tracing::info!(url, "controller connection established");

    Ok(Endpoint {
        channel: Channel::new(out_tx),
        inbound: in_rx,
    })
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Wrap a WebSocket accepted by an axum upgrade handler.
pub fn attach(socket: WebSocket) -> Endpoint {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let Some(text) = encode_frame(&envelope) else {
                continue;
            };
            if sink.send(AxumMessage::Text(text.into())).await.is_err() {
                tracing::debug!("executor socket gone, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(AxumMessage::Text(t)) => t.to_string(),
                Ok(AxumMessage::Binary(b)) => match String::from_utf8(b.to_vec()) {
                    Ok(s) => s,
                    Err(_) => {
                        tracing::warn!("dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(AxumMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "executor socket read error");
                    break;
                }
            };
            if let Some(envelope) = decode_frame(&text) {
                if in_tx.send(envelope).is_err() {
                    break;
                }
            }
        }
    });

    Endpoint {
        channel: Channel::new(out_tx),
        inbound: in_rx,
    }
}

// ---------------------------------------------------------------------------
// Frame helpers
// ---------------------------------------------------------------------------

fn encode_frame(envelope: &Envelope) -> Option<String> {
    match envelope.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!(
                error = %e,
                command = %envelope.command,
                "dropping envelope that failed to encode"
            );
            None
        }
    }
}

fn decode_frame(text: &str) -> Option<Envelope> {
    match Envelope::decode(text) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable frame");
            None
        }
    }
}
