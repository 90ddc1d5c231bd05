//! Core channel handle and endpoint types.

use hive_types::{Envelope, HiveError};
use tokio::sync::mpsc;

/// Receiver for envelopes arriving from the remote endpoint.
///
/// Yields `None` once the transport has shut down.
pub type Inbound = mpsc::UnboundedReceiver<Envelope>;

/// Outbound half of a duplex envelope transport.
///
/// Sending never blocks: envelopes are queued and written by the transport's
/// writer task in the order they were sent.
#[derive(Debug, Clone)]
pub struct Channel {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Channel {
    /// Wrap the sending side of a transport's outbound queue.
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    /// Queue an envelope for delivery.
    pub fn send(&self, envelope: Envelope) -> Result<(), HiveError> {
        self.tx.send(envelope).map_err(|_| HiveError::ChannelClosed)
    }

    /// Whether the transport has stopped accepting envelopes.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the transport stops accepting envelopes.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// One side of an established connection.
#[derive(Debug)]
pub struct Endpoint {
    /// Send envelopes to the remote side.
    pub channel: Channel,
    /// Envelopes received from the remote side.
    pub inbound: Inbound,
}

/// Create two in-process endpoints wired to each other.
///
/// Whatever one side sends arrives, in order, on the other side's inbound
/// receiver. No encoding takes place.
pub fn memory_pair() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let a = Endpoint {
        channel: Channel::new(a_tx),
        inbound: b_rx,
    };
    let b = Endpoint {
        channel: Channel::new(b_tx),
        inbound: a_rx,
    };
    (a, b)
}
