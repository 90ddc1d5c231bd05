//! Send-and-correlate behaviour shared by every controller-side entity.
//!
//! A [`Bridge`] binds an addressee ([`PageRef`]) to the session's shared
//! [`Channel`] and a private [`Correlator`]. `Session` and `Page` each hold
//! one and build their typed operations on [`Bridge::request`].

use std::sync::Arc;
use std::time::Duration;

use hive_channel::Channel;
use hive_types::{CorrelationId, Envelope, HiveError, PageRef};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::correlator::{Correlator, Reply};

/// A sent request whose response has not been awaited yet.
#[must_use = "a pending reply does nothing unless awaited"]
#[derive(Debug)]
pub struct PendingReply {
    id: CorrelationId,
    command: String,
    rx: oneshot::Receiver<Reply>,
    closed: HiveError,
}

impl PendingReply {
    /// Correlation id the request was sent with.
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the response with no time limit.
    pub async fn recv(self) -> Result<Vec<Value>, HiveError> {
        match self.rx.await {
            Ok(reply) => reply,
            Err(_) => Err(self.closed),
        }
    }
}

#[derive(Debug)]
struct Inner {
    target: PageRef,
    channel: Channel,
    correlator: Correlator,
    timeout: Option<Duration>,
}

/// Command bridge for one entity.
#[derive(Debug, Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    pub fn new(target: PageRef, channel: Channel, timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                correlator: Correlator::new(target.clone()),
                target,
                channel,
                timeout,
            }),
        }
    }

    /// Addressee stamped on every envelope this bridge sends.
    pub fn target(&self) -> &PageRef {
        &self.inner.target
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    /// Send `command` and return a handle to its response.
    ///
    /// The continuation is registered before the envelope is handed to the
    /// channel so a fast response can never miss it.
    pub fn send(&self, command: &str, args: Vec<Value>) -> Result<PendingReply, HiveError> {
        let correlator = &self.inner.correlator;
        let id = correlator.next_id();
        let (tx, rx) = oneshot::channel();
        correlator.register(id, tx)?;

        let target = self.inner.target.clone();
        let envelope = Envelope::request(target, CorrelationId(id), command, args);
        tracing::debug!(target_ref = %self.inner.target, id, command, "sending command");
        if let Err(e) = self.inner.channel.send(envelope) {
            correlator.cancel(id);
            return Err(e);
        }

        Ok(PendingReply {
            id: CorrelationId(id),
            command: command.to_string(),
            rx,
            closed: correlator.closed_error(),
        })
    }

    /// Send `command` and wait for its response, bounded by the configured
    /// request timeout.
    pub async fn request(&self, command: &str, args: Vec<Value>) -> Result<Vec<Value>, HiveError> {
        let pending = self.send(command, args)?;
        let Some(duration) = self.inner.timeout else {
            return pending.recv().await;
        };
        let id = pending.id();
        match tokio::time::timeout(duration, pending.recv()).await {
            Ok(reply) => reply,
            Err(_) => {
                self.inner.correlator.cancel(id.0);
                tracing::warn!(
                    target_ref = %self.inner.target,
                    id = id.0,
                    command,
                    "request timed out"
                );
                Err(HiveError::Timeout {
                    command: command.to_string(),
                    duration,
                })
            }
        }
    }

    /// Send `command` without expecting a response.
    pub fn notify(&self, command: &str, args: Vec<Value>) -> Result<(), HiveError> {
        if self.inner.correlator.is_closed() {
            return Err(self.inner.correlator.closed_error());
        }
        let envelope = Envelope::request(
            self.inner.target.clone(),
            CorrelationId(self.inner.correlator.next_id()),
            command,
            args,
        );
        self.inner.channel.send(envelope)
    }

    /// Route a response envelope to its continuation.
    pub fn deliver(&self, envelope: Envelope) -> bool {
        let reply = match envelope.error {
            Some(message) => Err(HiveError::Remote {
                command: envelope.command,
                message,
            }),
            None => Ok(envelope.args),
        };
        self.inner.correlator.resolve(envelope.command_id.0, reply)
    }

    /// Fail every pending request and refuse new ones.
    pub fn close(&self) {
        self.inner.correlator.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.correlator.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_channel::memory_pair;
    use hive_types::{EntityId, SessionId};
    use serde_json::json;

    fn session_ref() -> PageRef {
        PageRef::Session(SessionId::new("hive-t"))
    }

    #[tokio::test]
    async fn send_tags_envelope_and_resolves_on_delivery() {
        let (controller, mut executor) = memory_pair();
        let bridge = Bridge::new(PageRef::Entity(EntityId(7)), controller.channel, None);

        let pending = bridge.send("get", vec![json!("url")]).unwrap();
        let sent = executor.inbound.recv().await.unwrap();
        assert_eq!(sent.page, PageRef::Entity(EntityId(7)));
        assert_eq!(sent.command_id, pending.id());
        assert_eq!(sent.command, "get");
        assert_eq!(sent.args, vec![json!("url")]);

        assert!(bridge.deliver(sent.reply(vec![json!("http://example.com")])));
        assert_eq!(pending.recv().await.unwrap(), vec![json!("http://example.com")]);
        assert_eq!(bridge.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn responses_only_resolve_their_own_request() {
        let (controller, mut executor) = memory_pair();
        let bridge = Bridge::new(session_ref(), controller.channel, None);

        let first = bridge.send("get", vec![json!("a")]).unwrap();
        let second = bridge.send("get", vec![json!("b")]).unwrap();
        let _ = executor.inbound.recv().await.unwrap();
        let env_b = executor.inbound.recv().await.unwrap();

        bridge.deliver(env_b.reply(vec![json!("B")]));
        assert_eq!(second.recv().await.unwrap(), vec![json!("B")]);
        assert_eq!(bridge.correlator().pending_count(), 1);
        assert!(bridge.correlator().cancel(first.id().0));
    }

    #[tokio::test]
    async fn error_field_becomes_remote_error() {
        let (controller, mut executor) = memory_pair();
        let bridge = Bridge::new(session_ref(), controller.channel, None);

        let pending = bridge.send("open", vec![]).unwrap();
        let sent = executor.inbound.recv().await.unwrap();
        bridge.deliver(sent.fault("missing url"));

        match pending.recv().await.unwrap_err() {
            HiveError::Remote { command, message } => {
                assert_eq!(command, "open");
                assert_eq!(message, "missing url");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_and_cancels_entry() {
        let (controller, _executor) = memory_pair();
        let bridge = Bridge::new(session_ref(), controller.channel, Some(Duration::from_secs(5)));

        let err = bridge.request("get", vec![json!("url")]).await.unwrap_err();
        assert!(matches!(err, HiveError::Timeout { .. }));
        assert_eq!(bridge.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn close_fails_waiters_and_later_sends() {
        let (controller, _executor) = memory_pair();
        let bridge = Bridge::new(session_ref(), controller.channel, None);

        let pending = bridge.send("get", vec![json!("url")]).unwrap();
        bridge.close();
        assert!(matches!(pending.recv().await, Err(HiveError::SessionClosed(_))));
        assert!(matches!(bridge.send("get", vec![]), Err(HiveError::SessionClosed(_))));
        assert!(bridge.notify("done", vec![]).is_err());
    }

    #[tokio::test]
    async fn send_on_dead_channel_leaves_nothing_pending() {
        let (controller, executor) = memory_pair();
        drop(executor);
        let bridge = Bridge::new(session_ref(), controller.channel, None);
        assert!(matches!(bridge.send("get", vec![]), Err(HiveError::ChannelClosed)));
        assert_eq!(bridge.correlator().pending_count(), 0);
    }
}
