//! The controller-side session: one executor process, one channel, many
//! pages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hive_channel::Endpoint;
use hive_types::{BridgeConfig, Cookie, EntityId, HiveError, PageRef, SessionCommand, SessionId};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::events::{Event, EventHub};
use crate::listener::SessionListener;
use crate::page::Page;
use crate::registry::PageRegistry;
use crate::reply;
use crate::router;
use crate::supervisor::{self, ProcessHandle};

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) bridge: Bridge,
    pub(crate) pages: Arc<PageRegistry>,
    pub(crate) events: EventHub,
    pub(crate) request_timeout: Option<Duration>,
    shutdown_grace: Duration,
    closed: watch::Sender<bool>,
    process: Mutex<Option<ProcessHandle>>,
    listener: Mutex<Option<SessionListener>>,
}

impl SessionInner {
    /// Build a page handle bound to this session's channel.
    pub(crate) fn new_page(&self, id: EntityId) -> Page {
        Page::new(
            id,
            self.bridge.channel().clone(),
            self.request_timeout,
            Arc::downgrade(&self.pages),
        )
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Make every entity of the session unusable. Idempotent.
    pub(crate) fn teardown(&self) {
        self.bridge.close();
        for page in self.pages.drain() {
            page.mark_closed();
        }
        self.events.clear();
        drop(self.listener.lock().unwrap_or_else(|e| e.into_inner()).take());
        if !self.closed.send_replace(true) {
            info!(session = %self.id, "session closed");
        }
    }

    fn process(&self) -> Option<ProcessHandle> {
        self.process.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Handle to a live session.
///
/// Cheap to clone; all clones share the same executor and pages.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Bind a listener, spawn the executor and wait for it to connect back.
    pub async fn launch(config: &BridgeConfig) -> Result<Self, HiveError> {
        let id = SessionId::next();
        let mut listener = SessionListener::bind(&config.listen, id.clone()).await?;
        let address = listener.address();
        let process = supervisor::spawn(&config.executor, &address, id.as_str())?;

        let connect_timeout = config.connect_timeout();
        let outcome = tokio::select! {
            accepted = listener.accept() => accepted,
            code = process.wait() => Err(HiveError::Spawn(format!(
                "executor exited with {code:?} before connecting"
            ))),
            () = tokio::time::sleep(connect_timeout) => Err(HiveError::Timeout {
                command: "connect".into(),
                duration: connect_timeout,
            }),
        };
        let endpoint = match outcome {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(session = %id, error = %e, "executor failed to connect");
                process.stop(config.shutdown_grace()).await;
                return Err(e);
            }
        };

        let session = Self::build(id, endpoint, config);
        *session.inner.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
        *session.inner.process.lock().unwrap_or_else(|e| e.into_inner()) = Some(process.clone());

        let watched = Arc::downgrade(&session.inner);
        tokio::spawn(async move {
            let code = process.wait().await;
            if let Some(inner) = watched.upgrade() {
                if !inner.is_closed() {
                    warn!(session = %inner.id, code = ?code, "executor exited unexpectedly");
                }
                inner.teardown();
            }
        });

        info!(session = %session.id(), "session ready");
        Ok(session)
    }

    /// Run a session over an already-connected endpoint. No process is
    /// supervised; the session ends when the channel closes.
    pub fn attach(id: SessionId, endpoint: Endpoint, config: &BridgeConfig) -> Self {
        Self::build(id, endpoint, config)
    }

    fn build(id: SessionId, endpoint: Endpoint, config: &BridgeConfig) -> Self {
        let Endpoint { channel, inbound } = endpoint;
        let request_timeout = config.request_timeout();
        let (closed, _) = watch::channel(false);
        let inner = Arc::new(SessionInner {
            bridge: Bridge::new(PageRef::Session(id.clone()), channel, request_timeout),
            id,
            pages: Arc::new(PageRegistry::new()),
            events: EventHub::new(),
            request_timeout,
            shutdown_grace: config.shutdown_grace(),
            closed,
            process: Mutex::new(None),
            listener: Mutex::new(None),
        });
        tokio::spawn(router::run(Arc::clone(&inner), inbound));
        Self { inner }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }

    /// The supervised executor, if this session launched one.
    pub fn process(&self) -> Option<ProcessHandle> {
        self.inner.process()
    }

    /// Whether the session can still be used.
    pub fn is_alive(&self) -> bool {
        !self.inner.is_closed() && self.process().map_or(true, |p| p.is_running())
    }

    /// Resolves once the session has been torn down.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn call(
        &self,
        command: SessionCommand,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, HiveError> {
        self.inner.bridge.request(command.as_str(), args).await
    }

    // -----------------------------------------------------------------------
    // Pages
    // -----------------------------------------------------------------------

    /// Create a new page in the executor.
    pub async fn create_page(&self) -> Result<Page, HiveError> {
        let args = self.call(SessionCommand::CreatePage, vec![]).await?;
        let command = SessionCommand::CreatePage.as_str();
        let id = reply::first(args)
            .as_u64()
            .map(EntityId)
            .ok_or_else(|| HiveError::unexpected(command, "expected a numeric page id"))?;
        // The router registers the page before resolving the request.
        self.inner
            .pages
            .get(id)
            .ok_or_else(|| HiveError::unexpected(command, format!("page {id} was not registered")))
    }

    pub fn page(&self, id: EntityId) -> Option<Page> {
        self.inner.pages.get(id)
    }

    /// Every live page, ordered by id.
    pub fn pages(&self) -> Vec<Page> {
        self.inner.pages.list()
    }

    // -----------------------------------------------------------------------
    // Executor-wide operations
    // -----------------------------------------------------------------------

    /// Inject a local script file into the executor's global context.
    pub async fn inject_js(&self, path: &str) -> Result<bool, HiveError> {
        let args = self.call(SessionCommand::InjectJs, vec![Value::from(path)]).await?;
        reply::first_bool(SessionCommand::InjectJs.as_str(), args)
    }

    pub async fn add_cookie(&self, cookie: &Cookie) -> Result<bool, HiveError> {
        let args = self
            .call(SessionCommand::AddCookie, vec![reply::cookie(cookie)?])
            .await?;
        reply::first_bool(SessionCommand::AddCookie.as_str(), args)
    }

    pub async fn add_cookies(&self, cookies: &[Cookie]) -> Result<Vec<bool>, HiveError> {
        let batch = cookies.iter().map(reply::cookie).collect::<Result<Vec<_>, _>>()?;
        let args = self
            .call(SessionCommand::AddCookie, vec![Value::Array(batch)])
            .await?;
        reply::bools(SessionCommand::AddCookie.as_str(), args, cookies.len())
    }

    pub async fn delete_cookie(&self, name: &str) -> Result<bool, HiveError> {
        let args = self
            .call(SessionCommand::DeleteCookie, vec![Value::from(name)])
            .await?;
        reply::first_bool(SessionCommand::DeleteCookie.as_str(), args)
    }

    pub async fn delete_cookies(&self, names: &[&str]) -> Result<Vec<bool>, HiveError> {
        let batch = names.iter().map(|n| Value::from(*n)).collect();
        let args = self
            .call(SessionCommand::DeleteCookie, vec![Value::Array(batch)])
            .await?;
        reply::bools(SessionCommand::DeleteCookie.as_str(), args, names.len())
    }

    pub async fn clear_cookies(&self) -> Result<(), HiveError> {
        self.call(SessionCommand::ClearCookies, vec![]).await?;
        Ok(())
    }

    /// Read one executor property (`version`, `cookies`, `cookiesEnabled`, ...).
    pub async fn get(&self, key: &str) -> Result<Value, HiveError> {
        let args = self.call(SessionCommand::Get, vec![Value::from(key)]).await?;
        Ok(reply::first(args))
    }

    pub async fn get_many(&self, keys: &[&str]) -> Result<Map<String, Value>, HiveError> {
        let args = self.call(SessionCommand::Get, vec![reply::key_map(keys)]).await?;
        reply::first_object(SessionCommand::Get.as_str(), args)
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), HiveError> {
        self.call(SessionCommand::Set, vec![Value::from(key), value]).await?;
        Ok(())
    }

    pub async fn set_many(&self, values: Map<String, Value>) -> Result<(), HiveError> {
        self.call(SessionCommand::Set, vec![Value::Object(values)]).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events and shutdown
    // -----------------------------------------------------------------------

    /// Register a listener for session-level events.
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Close every page, tell the executor to terminate and wait for it.
    ///
    /// Runs the exit handshake: `exit` (pages closed, acknowledged), then
    /// `done` (no response, the executor terminates). A supervised process
    /// that does not exit within the shutdown grace period is killed.
    pub async fn exit(&self) -> Result<(), HiveError> {
        if self.inner.is_closed() {
            return Ok(());
        }
        let acknowledged = self.call(SessionCommand::Exit, vec![]).await;
        for page in self.inner.pages.drain() {
            page.mark_closed();
        }
        if let Err(e) = self.inner.bridge.notify(SessionCommand::Done.as_str(), vec![]) {
            debug!(session = %self.inner.id, error = %e, "could not send done");
        }

        if let Some(process) = self.process() {
            let grace = self.inner.shutdown_grace;
            let code = match tokio::time::timeout(grace, process.wait()).await {
                Ok(code) => code,
                Err(_) => process.stop(grace).await,
            };
            debug!(session = %self.inner.id, code = ?code, "executor stopped");
        }

        self.inner.teardown();
        acknowledged.map(|_| ())
    }
}
