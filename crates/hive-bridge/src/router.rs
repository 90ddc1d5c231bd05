//! Routes envelopes arriving from the executor to the session's entities.
//!
//! One task per session drains the inbound queue, so responses and events
//! are handled strictly in arrival order. Envelopes for unknown pages are
//! logged and dropped; the request timeout bounds any caller left waiting.

use std::sync::Arc;

use hive_channel::Inbound;
use hive_types::{EngineEvent, EntityId, Envelope, HiveError, PageRef, SessionCommand};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::session::SessionInner;

pub(crate) async fn run(session: Arc<SessionInner>, mut inbound: Inbound) {
    while let Some(envelope) = inbound.recv().await {
        route(&session, envelope);
    }
    debug!(session = %session.id, "executor channel closed");
    session.teardown();
}

pub(crate) fn route(session: &SessionInner, envelope: Envelope) {
    match envelope.page.clone() {
        PageRef::Session(id) => {
            if id != session.id {
                warn!(
                    session = %session.id,
                    addressee = %id,
                    command = %envelope.command,
                    "dropping envelope for another session"
                );
                return;
            }
            if envelope.is_event() {
                session.events.emit(&envelope.command, &envelope.args);
            } else if envelope.command == SessionCommand::CreatePage.as_str()
                && envelope.error.is_none()
            {
                page_created(session, envelope);
            } else {
                deliver(&session.bridge, envelope);
            }
        }
        PageRef::Entity(page_id) => {
            let Some(page) = session.pages.get(page_id) else {
                warn!(
                    session = %session.id,
                    page = page_id.0,
                    command = %envelope.command,
                    "dropping envelope for unknown page"
                );
                return;
            };
            if envelope.is_event() {
                let event = EngineEvent::from_wire_name(&envelope.command);
                if event == Some(EngineEvent::ConsoleMessage) {
                    log_console(session, page_id, &envelope.args);
                }
                page.events().emit(&envelope.command, &envelope.args);
            } else {
                deliver(page.bridge(), envelope);
            }
        }
    }
}

fn deliver(bridge: &Bridge, envelope: Envelope) {
    let id = envelope.command_id;
    let command = envelope.command.clone();
    if !bridge.deliver(envelope) {
        debug!(
            addressee = %bridge.target(),
            id = id.0,
            command = %command,
            pending = bridge.correlator().pending_count(),
            "response matched no pending request"
        );
    }
}

/// Register the new page before resolving `createPage`, so the caller can
/// look it up as soon as its request completes.
fn page_created(session: &SessionInner, envelope: Envelope) {
    let id = match envelope.args.first().and_then(Value::as_u64) {
        Some(id) => EntityId(id),
        None => {
            warn!(
                session = %session.id,
                args = ?envelope.args,
                "createPage reply without a page id"
            );
            session.bridge.deliver(envelope);
            return;
        }
    };
    let request = envelope.command_id.0;
    if !session.bridge.correlator().is_pending(request) {
        warn!(
            session = %session.id,
            page = id.0,
            id = request,
            "createPage reply matched no pending request, page not registered"
        );
        return;
    }
    let page = session.new_page(id);
    match session.pages.insert(page.clone()) {
        Ok(()) => {
            if session.bridge.deliver(envelope) {
                info!(session = %session.id, page = id.0, "page created");
            } else {
                // The request timed out between the check and delivery.
                session.pages.remove(id);
                page.mark_closed();
                warn!(session = %session.id, page = id.0, "createPage caller gone, page dropped");
            }
        }
        Err(e) => {
            warn!(session = %session.id, page = id.0, "executor reused a live page id");
            resolve_err(session, &envelope, e);
        }
    }
}

fn resolve_err(session: &SessionInner, envelope: &Envelope, error: HiveError) {
    session
        .bridge
        .correlator()
        .resolve(envelope.command_id.0, Err(error));
}

fn log_console(session: &SessionInner, page: EntityId, args: &[Value]) {
    let message = match args.first() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    info!(session = %session.id, page = page.0, "console: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use hive_channel::{memory_pair, Endpoint};
    use hive_types::{BridgeConfig, CorrelationId, SessionId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn attached(name: &str) -> (Session, Endpoint) {
        let (controller, executor) = memory_pair();
        let session = Session::attach(SessionId::new(name), controller, &BridgeConfig::default());
        (session, executor)
    }

    /// Answer the next `createPage` with `id`.
    async fn answer_create(executor: &mut Endpoint, id: u64) {
        let request = executor.inbound.recv().await.unwrap();
        assert_eq!(request.command, "createPage");
        executor.channel.send(request.reply(vec![json!(id)])).unwrap();
    }

    #[tokio::test]
    async fn create_page_registers_before_resolving() {
        let (session, mut executor) = attached("S1");
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });

        let request = executor.inbound.recv().await.unwrap();
        assert_eq!(request.page, PageRef::Session(SessionId::new("S1")));
        assert_eq!(request.command_id, CorrelationId(1));
        executor.channel.send(request.reply(vec![json!(7)])).unwrap();

        let page = creating.await.unwrap().unwrap();
        assert_eq!(page.id(), EntityId(7));
        assert_eq!(session.page(EntityId(7)).unwrap().id(), EntityId(7));
    }

    #[tokio::test(start_paused = true)]
    async fn late_create_page_reply_registers_nothing() {
        let (controller, mut executor) = memory_pair();
        let config = BridgeConfig {
            request_timeout_secs: 1,
            ..BridgeConfig::default()
        };
        let session = Session::attach(SessionId::new("S-late"), controller, &config);

        let err = session.create_page().await.unwrap_err();
        assert!(matches!(err, HiveError::Timeout { .. }));
        answer_create(&mut executor, 1).await;

        // Replies are routed in order, so once page 2 resolves the late
        // reply for page 1 has been handled.
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 2).await;
        assert_eq!(creating.await.unwrap().unwrap().id(), EntityId(2));

        assert!(session.page(EntityId(1)).is_none());
        let live: Vec<EntityId> = session.pages().iter().map(|p| p.id()).collect();
        assert_eq!(live, vec![EntityId(2)]);
        assert_eq!(session.bridge().correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn page_get_resolves_only_its_request() {
        let (session, mut executor) = attached("S2");
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 7).await;
        let page = creating.await.unwrap().unwrap();

        // Leave a session-level request outstanding.
        let outstanding = session.bridge().send("get", vec![json!("version")]).unwrap();
        let _ = executor.inbound.recv().await.unwrap();

        let getting = tokio::spawn({
            let page = page.clone();
            async move { page.get("url").await }
        });
        let request = executor.inbound.recv().await.unwrap();
        assert_eq!(request.page, PageRef::Entity(EntityId(7)));
        assert_eq!(request.args, vec![json!("url")]);
        executor
            .channel
            .send(request.reply(vec![json!("http://example.com")]))
            .unwrap();

        assert_eq!(getting.await.unwrap().unwrap(), json!("http://example.com"));
        assert_eq!(session.bridge().correlator().pending_count(), 1);
        assert!(session.bridge().correlator().cancel(outstanding.id().0));
    }

    #[tokio::test]
    async fn events_reach_listeners_and_resolve_nothing() {
        let (session, mut executor) = attached("S3");
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 7).await;
        let page = creating.await.unwrap().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        page.on("loadFinished", move |args| sink.lock().unwrap().push(args.to_vec()));
        let mut stream = page.subscribe();

        let pending = page.bridge().send("open", vec![json!("http://example.com")]).unwrap();
        let _ = executor.inbound.recv().await.unwrap();

        executor
            .channel
            .send(Envelope::event(EntityId(7), "loadFinished", vec![json!("success")]))
            .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event.name, "loadFinished");
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!("success")]]);
        assert_eq!(page.bridge().correlator().pending_count(), 1);
        page.bridge().correlator().cancel(pending.id().0);
    }

    #[tokio::test]
    async fn duplicate_page_id_fails_create_page() {
        let (session, mut executor) = attached("S4");
        let first = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 3).await;
        first.await.unwrap().unwrap();

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 3).await;
        let err = second.await.unwrap().unwrap_err();
        assert!(matches!(err, HiveError::DuplicateEntity(EntityId(3))));
        assert_eq!(session.pages().len(), 1);
    }

    #[tokio::test]
    async fn unknown_page_and_foreign_session_are_dropped() {
        let (session, executor) = attached("S5");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        session.on("alert", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut stream = session.subscribe();

        executor
            .channel
            .send(Envelope::event(EntityId(99), "alert", vec![]))
            .unwrap();
        executor
            .channel
            .send(Envelope::event(SessionId::new("other"), "alert", vec![]))
            .unwrap();
        executor
            .channel
            .send(Envelope::event(SessionId::new("S5"), "alert", vec![json!("hi")]))
            .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event.args, vec![json!("hi")]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn executor_death_fails_every_pending_request() {
        let (session, mut executor) = attached("S6");
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 1).await;
        let page = creating.await.unwrap().unwrap();

        let page_wait = page.bridge().send("open", vec![json!("http://example.com")]).unwrap();
        let session_wait = session.bridge().send("get", vec![json!("version")]).unwrap();
        drop(executor);

        assert!(matches!(page_wait.recv().await, Err(HiveError::EntityClosed(EntityId(1)))));
        assert!(matches!(session_wait.recv().await, Err(HiveError::SessionClosed(_))));
        session.closed().await;
        assert!(!session.is_alive());
        assert!(page.is_closed());
        assert!(session.pages().is_empty());
        assert!(matches!(page.get("url").await, Err(HiveError::EntityClosed(_))));
    }

    #[tokio::test]
    async fn remote_fault_fails_the_call() {
        let (session, mut executor) = attached("S7");
        let injecting = tokio::spawn({
            let session = session.clone();
            async move { session.inject_js("missing.js").await }
        });
        let request = executor.inbound.recv().await.unwrap();
        executor.channel.send(request.fault("no such file")).unwrap();
        let err = injecting.await.unwrap().unwrap_err();
        assert!(matches!(err, HiveError::Remote { ref message, .. } if message == "no such file"));
    }

    #[tokio::test]
    async fn exit_runs_handshake_and_closes_pages() {
        let (session, mut executor) = attached("S8");
        let creating = tokio::spawn({
            let session = session.clone();
            async move { session.create_page().await }
        });
        answer_create(&mut executor, 2).await;
        let page = creating.await.unwrap().unwrap();

        let exiting = tokio::spawn({
            let session = session.clone();
            async move { session.exit().await }
        });
        let exit = executor.inbound.recv().await.unwrap();
        assert_eq!(exit.command, "exit");
        executor.channel.send(exit.reply(vec![])).unwrap();
        let done = executor.inbound.recv().await.unwrap();
        assert_eq!(done.command, "done");

        exiting.await.unwrap().unwrap();
        assert!(page.is_closed());
        assert!(!session.is_alive());
        // A second exit is a no-op.
        session.exit().await.unwrap();
    }
}
