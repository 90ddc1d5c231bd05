//! The interface the dispatcher drives.
//!
//! An [`Engine`] is the executor-wide object (global script injection,
//! the shared cookie jar, executor properties) and creates [`EnginePage`]s.
//! Both are driven from the single routing task, so methods take `&mut self`
//! and return synchronously. The two callback-style operations, `open` and
//! `include_js`, start their work immediately and return a [`Completion`]
//! that the router awaits on a separate task.

use futures_util::future::BoxFuture;
use hive_channel::Channel;
use hive_types::{EngineEvent, EntityId, Envelope, Script};
use serde_json::Value;
use thiserror::Error;

/// Errors raised by engine operations.
///
/// These never stop the executor: the dispatcher reports them in the
/// `error` field of the response.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("'{command}' requires argument {index}")]
    MissingArgument { command: String, index: usize },

    #[error("invalid argument for '{command}': {detail}")]
    InvalidArgument { command: String, detail: String },

    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid(command: &str, detail: impl Into<String>) -> Self {
        EngineError::InvalidArgument {
            command: command.to_string(),
            detail: detail.into(),
        }
    }
}

/// Deferred result of a callback-style operation.
pub type Completion<T> = BoxFuture<'static, Result<T, EngineError>>;

/// Named, JSON-valued properties (`get` / `set`).
pub trait PropertyTarget {
    /// Current value of `key`; `Null` for unknown keys.
    fn property(&self, key: &str) -> Result<Value, EngineError>;

    /// Replace the value of `key`.
    fn set_property(&mut self, key: &str, value: Value) -> Result<(), EngineError>;
}

pub trait CookieJar {
    /// Add or replace a cookie. Returns `false` if the engine refused it.
    fn add_cookie(&mut self, cookie: &Value) -> Result<bool, EngineError>;

    /// Returns `true` if a cookie was removed.
    fn delete_cookie(&mut self, name: &str) -> Result<bool, EngineError>;

    fn clear_cookies(&mut self) -> Result<(), EngineError>;
}

/// One page of the engine.
pub trait EnginePage: PropertyTarget + CookieJar + Send + 'static {
    /// Start loading `url`; completes with the load status.
    fn open(&mut self, url: &str) -> Completion<String>;

    /// Start loading a remote script; completes once it has run.
    fn include_js(&mut self, url: &str) -> Completion<()>;

    /// Run `script` with `args` as its positional parameters.
    fn evaluate(&mut self, script: &Script, args: &[Value]) -> Result<Value, EngineError>;

    /// Run `script` without waiting for it.
    fn evaluate_async(&mut self, script: &Script) -> Result<(), EngineError>;

    fn inject_js(&mut self, path: &str) -> Result<bool, EngineError>;

    fn render(&mut self, path: &str) -> Result<(), EngineError>;

    fn render_base64(&mut self, format: &str) -> Result<String, EngineError>;

    fn send_event(&mut self, kind: &str, args: &[Value]) -> Result<(), EngineError>;

    fn upload_file(&mut self, selector: &str, path: &str) -> Result<(), EngineError>;

    /// Release the page. No other method is called afterwards.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// The executor-wide engine object.
pub trait Engine: PropertyTarget + CookieJar + Send {
    type Page: EnginePage;

    /// Create a page whose callbacks are reported through `events`.
    fn create_page(&mut self, events: EventSink) -> Result<Self::Page, EngineError>;

    /// Inject a script file into the global context.
    fn inject_js(&mut self, path: &str) -> Result<bool, EngineError>;
}

/// Forwards one page's engine callbacks as unsolicited envelopes.
#[derive(Debug, Clone)]
pub struct EventSink {
    page: EntityId,
    channel: Channel,
}

impl EventSink {
    pub fn new(page: EntityId, channel: Channel) -> Self {
        Self { page, channel }
    }

    pub fn page(&self) -> EntityId {
        self.page
    }

    pub fn emit(&self, event: EngineEvent, args: Vec<Value>) {
        self.emit_named(event.wire_name(), args);
    }

    /// Emit an event by engine callback name (`onLoadFinished`) or wire
    /// name (`loadFinished`).
    pub fn emit_callback(&self, name: &str, args: Vec<Value>) {
        let name = hive_types::event_name_for_callback(name);
        self.emit_named(&name, args);
    }

    fn emit_named(&self, name: &str, args: Vec<Value>) {
        if self.channel.send(Envelope::event(self.page, name, args)).is_err() {
            tracing::debug!(page = self.page.0, event = name, "event dropped, channel closed");
        }
    }
}
