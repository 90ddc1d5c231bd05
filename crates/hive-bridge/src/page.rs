//! Controller-side handle to one executor page.

use std::sync::{Arc, Weak};

use hive_channel::Channel;
use hive_types::{Cookie, EntityId, HiveError, PageCommand, PageRef, Script};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::bridge::Bridge;
use crate::events::{Event, EventHub};
use crate::registry::PageRegistry;
use crate::reply;

#[derive(Debug)]
struct PageInner {
    id: EntityId,
    bridge: Bridge,
    events: EventHub,
    registry: Weak<PageRegistry>,
}

/// A page living inside the executor.
///
/// Cheap to clone; all clones address the same page. Once the page is
/// closed, or its session ends, every operation fails with
/// [`HiveError::EntityClosed`].
#[derive(Debug, Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    pub(crate) fn new(
        id: EntityId,
        channel: Channel,
        timeout: Option<std::time::Duration>,
        registry: Weak<PageRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(PageInner {
                id,
                bridge: Bridge::new(PageRef::Entity(id), channel, timeout),
                events: EventHub::new(),
                registry,
            }),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }

    pub fn is_closed(&self) -> bool {
        self.inner.bridge.is_closed()
    }

    async fn call(&self, command: PageCommand, args: Vec<Value>) -> Result<Vec<Value>, HiveError> {
        self.inner.bridge.request(command.as_str(), args).await
    }

    // -----------------------------------------------------------------------
    // Navigation and scripting
    // -----------------------------------------------------------------------

    /// Load `url` and return the engine's load status (`"success"`/`"fail"`).
    pub async fn open(&self, url: &str) -> Result<String, HiveError> {
        let args = self.call(PageCommand::Open, vec![Value::from(url)]).await?;
        reply::first_string(PageCommand::Open.as_str(), args)
    }

    /// Run `script` in the page with `args` spread as its parameters and
    /// return its result.
    pub async fn evaluate(
        &self,
        script: impl Into<Script>,
        args: Vec<Value>,
    ) -> Result<Value, HiveError> {
        let mut payload = Vec::with_capacity(args.len() + 1);
        payload.push(Value::from(script.into()));
        payload.extend(args);
        let reply = self.call(PageCommand::Evaluate, payload).await?;
        Ok(reply::first(reply))
    }

    /// Start `script` in the page without waiting for it to finish.
    pub async fn evaluate_async(&self, script: impl Into<Script>) -> Result<(), HiveError> {
        self.call(PageCommand::EvaluateAsync, vec![Value::from(script.into())])
            .await?;
        Ok(())
    }

    /// Load a remote script into the page; resolves once it has loaded.
    pub async fn include_js(&self, url: &str) -> Result<(), HiveError> {
        self.call(PageCommand::IncludeJs, vec![Value::from(url)]).await?;
        Ok(())
    }

    /// Inject a local script file into the page.
    pub async fn inject_js(&self, path: &str) -> Result<bool, HiveError> {
        let args = self.call(PageCommand::InjectJs, vec![Value::from(path)]).await?;
        reply::first_bool(PageCommand::InjectJs.as_str(), args)
    }

    // -----------------------------------------------------------------------
    // Output and input
    // -----------------------------------------------------------------------

    /// Render the page to `path`; the format follows the file extension.
    pub async fn render(&self, path: &str) -> Result<(), HiveError> {
        self.call(PageCommand::Render, vec![Value::from(path)]).await?;
        Ok(())
    }

    /// Render the page and return the image base64 encoded.
    pub async fn render_base64(&self, format: &str) -> Result<String, HiveError> {
        let args = self
            .call(PageCommand::RenderBase64, vec![Value::from(format)])
            .await?;
        reply::first_string(PageCommand::RenderBase64.as_str(), args)
    }

    /// Send a synthetic input event, e.g. `("click", [x, y])` or
    /// `("keypress", ["a"])`.
    pub async fn send_event(&self, kind: &str, args: Vec<Value>) -> Result<(), HiveError> {
        let mut payload = vec![Value::from(kind)];
        payload.extend(args);
        self.call(PageCommand::SendEvent, payload).await?;
        Ok(())
    }

    pub async fn upload_file(&self, selector: &str, path: &str) -> Result<(), HiveError> {
        self.call(
            PageCommand::UploadFile,
            vec![Value::from(selector), Value::from(path)],
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cookies
    // -----------------------------------------------------------------------

    pub async fn add_cookie(&self, cookie: &Cookie) -> Result<bool, HiveError> {
        let args = self
            .call(PageCommand::AddCookie, vec![reply::cookie(cookie)?])
            .await?;
        reply::first_bool(PageCommand::AddCookie.as_str(), args)
    }

    /// Add several cookies in one round trip; one result per cookie.
    pub async fn add_cookies(&self, cookies: &[Cookie]) -> Result<Vec<bool>, HiveError> {
        let batch = cookies.iter().map(reply::cookie).collect::<Result<Vec<_>, _>>()?;
        let args = self
            .call(PageCommand::AddCookie, vec![Value::Array(batch)])
            .await?;
        reply::bools(PageCommand::AddCookie.as_str(), args, cookies.len())
    }

    pub async fn delete_cookie(&self, name: &str) -> Result<bool, HiveError> {
        let args = self
            .call(PageCommand::DeleteCookie, vec![Value::from(name)])
            .await?;
        reply::first_bool(PageCommand::DeleteCookie.as_str(), args)
    }

    pub async fn clear_cookies(&self) -> Result<(), HiveError> {
        self.call(PageCommand::ClearCookies, vec![]).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    /// Read one page property (`url`, `title`, `settings`, ...).
    pub async fn get(&self, key: &str) -> Result<Value, HiveError> {
        let args = self.call(PageCommand::Get, vec![Value::from(key)]).await?;
        Ok(reply::first(args))
    }

    /// Read several properties at once.
    pub async fn get_many(&self, keys: &[&str]) -> Result<Map<String, Value>, HiveError> {
        let args = self.call(PageCommand::Get, vec![reply::key_map(keys)]).await?;
        reply::first_object(PageCommand::Get.as_str(), args)
    }

    /// Write one page property. Setting `settings` merges into the
    /// existing settings instead of replacing them.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), HiveError> {
        self.call(PageCommand::Set, vec![Value::from(key), value]).await?;
        Ok(())
    }

    pub async fn set_many(&self, values: Map<String, Value>) -> Result<(), HiveError> {
        self.call(PageCommand::Set, vec![Value::Object(values)]).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle and events
    // -----------------------------------------------------------------------

    /// Close the page in the executor and release this handle.
    pub async fn close(&self) -> Result<(), HiveError> {
        self.call(PageCommand::Close, vec![]).await?;
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.remove(self.inner.id);
        }
        self.mark_closed();
        Ok(())
    }

    /// Register a listener for a page event (`loadFinished`, `jsError`,
    /// `consoleMessage`, ...).
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.events.on(event, listener);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub(crate) fn events(&self) -> &EventHub {
        &self.inner.events
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.bridge.close();
        self.inner.events.clear();
    }
}
