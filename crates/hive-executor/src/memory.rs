//! In-memory reference engine.
//!
//! Implements the engine traits without a browser: pages keep their
//! properties in a JSON map, navigation fires the usual event sequence, and
//! renders produce a fixed one-pixel image. Script evaluation goes through
//! an [`Evaluator`]; the default one understands a handful of expressions
//! (`document.title`, `location.href`, parameter names, JSON literals) and
//! `console.log(...)` calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::FutureExt;
use hive_types::{EngineEvent, Script};
use serde_json::{json, Map, Value};

use crate::engine::{
    Completion, CookieJar, Engine, EngineError, EnginePage, EventSink, PropertyTarget,
};

/// Smallest valid PNG: one transparent pixel.
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae,
    0x42, 0x60, 0x82,
];

const BLANK_CONTENT: &str = "<html><head></head><body></body></html>";

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Unknown; Linux x86_64) hive/",
    env!("CARGO_PKG_VERSION")
);

const INPUT_EVENTS: [&str; 8] = [
    "mouseup",
    "mousedown",
    "mousemove",
    "doubleclick",
    "click",
    "keyup",
    "keypress",
    "keydown",
];

/// Page state visible to an evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub url: String,
    pub title: String,
    pub content: String,
}

/// Script evaluation hook: `(source, args, page) -> result`.
pub type Evaluator =
    Arc<dyn Fn(&str, &[Value], &PageView) -> Result<Value, EngineError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Executor-wide state of the memory engine.
pub struct MemoryEngine {
    library_path: PathBuf,
    properties: Map<String, Value>,
    cookies: Vec<Value>,
    injected: Vec<PathBuf>,
    evaluator: Evaluator,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("library_path", &self.library_path)
            .field("properties", &self.properties)
            .field("cookies", &self.cookies.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

impl MemoryEngine {
    /// Relative script paths are resolved against `library_path`.
    pub fn new(library_path: PathBuf) -> Self {
        let mut properties = Map::new();
        properties.insert("cookiesEnabled".into(), json!(true));
        Self {
            library_path,
            properties,
            cookies: Vec::new(),
            injected: Vec::new(),
            evaluator: Arc::new(builtin_evaluate),
        }
    }

    /// Replace the script evaluator used by pages created from now on.
    pub fn with_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&str, &[Value], &PageView) -> Result<Value, EngineError> + Send + Sync + 'static,
    {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Script files injected into the global context so far.
    pub fn injected(&self) -> &[PathBuf] {
        &self.injected
    }

    fn resolve(&self, path: &str) -> PathBuf {
        resolve_path(&self.library_path, path)
    }
}

impl PropertyTarget for MemoryEngine {
    fn property(&self, key: &str) -> Result<Value, EngineError> {
        Ok(match key {
            "version" => version(),
            "libraryPath" => json!(self.library_path.display().to_string()),
            "cookies" => Value::Array(self.cookies.clone()),
            _ => self.properties.get(key).cloned().unwrap_or(Value::Null),
        })
    }

    fn set_property(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        match key {
            "version" => Err(EngineError::ReadOnly(key.into())),
            "libraryPath" => {
                let path = value
                    .as_str()
                    .ok_or_else(|| EngineError::invalid("set", "libraryPath must be a string"))?;
                self.library_path = PathBuf::from(path);
                Ok(())
            }
            "cookies" => {
                self.cookies = cookie_list(value)?;
                Ok(())
            }
            _ => {
                self.properties.insert(key.into(), value);
                Ok(())
            }
        }
    }
}

impl CookieJar for MemoryEngine {
    fn add_cookie(&mut self, cookie: &Value) -> Result<bool, EngineError> {
        Ok(add_to_jar(&mut self.cookies, cookie))
    }

    fn delete_cookie(&mut self, name: &str) -> Result<bool, EngineError> {
        Ok(delete_from_jar(&mut self.cookies, name))
    }

    fn clear_cookies(&mut self) -> Result<(), EngineError> {
        self.cookies.clear();
        Ok(())
    }
}

impl Engine for MemoryEngine {
    type Page = MemoryPage;

    fn create_page(&mut self, events: EventSink) -> Result<MemoryPage, EngineError> {
        Ok(MemoryPage::new(
            events,
            self.library_path.clone(),
            Arc::clone(&self.evaluator),
        ))
    }

    fn inject_js(&mut self, path: &str) -> Result<bool, EngineError> {
        let resolved = self.resolve(path);
        match std::fs::read_to_string(&resolved) {
            Ok(_) => {
                tracing::debug!(path = %resolved.display(), "injected script");
                self.injected.push(resolved);
                Ok(true)
            }
            Err(e) => {
                tracing::debug!(path = %resolved.display(), error = %e, "script not injected");
                Ok(false)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

pub struct MemoryPage {
    events: EventSink,
    library_path: PathBuf,
    evaluator: Evaluator,
    view: PageView,
    properties: Map<String, Value>,
    cookies: Vec<Value>,
    injected: Vec<PathBuf>,
    closed: bool,
}

impl std::fmt::Debug for MemoryPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPage")
            .field("page", &self.events.page())
            .field("view", &self.view)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MemoryPage {
    fn new(events: EventSink, library_path: PathBuf, evaluator: Evaluator) -> Self {
        let mut properties = Map::new();
        properties.insert(
            "settings".into(),
            json!({
                "javascriptEnabled": true,
                "loadImages": true,
                "localToRemoteUrlAccessEnabled": false,
                "userAgent": USER_AGENT,
                "XSSAuditingEnabled": false,
                "webSecurityEnabled": true,
            }),
        );
        properties.insert("viewportSize".into(), json!({"width": 400, "height": 300}));
        properties.insert(
            "clipRect".into(),
            json!({"top": 0, "left": 0, "width": 0, "height": 0}),
        );
        properties.insert("zoomFactor".into(), json!(1));
        properties.insert("customHeaders".into(), json!({}));
        properties.insert("navigationLocked".into(), json!(false));
        Self {
            events,
            library_path,
            evaluator,
            view: PageView {
                url: "about:blank".into(),
                title: String::new(),
                content: BLANK_CONTENT.into(),
            },
            properties,
            cookies: Vec::new(),
            injected: Vec::new(),
            closed: false,
        }
    }

    /// Script files injected into this page so far.
    pub fn injected(&self) -> &[PathBuf] {
        &self.injected
    }

    fn set_content(&mut self, content: String) {
        self.view.title = extract_title(&content);
        self.view.content = content;
    }

    /// Resolve a navigation synchronously; `None` means the load failed.
    fn load(&self, url: &str) -> Option<String> {
        if url == "about:blank" {
            return Some(BLANK_CONTENT.into());
        }
        if let Some(path) = url.strip_prefix("file://") {
            return std::fs::read_to_string(path).ok();
        }
        if let Some(data) = url.strip_prefix("data:") {
            return data.split_once(',').map(|(_, body)| body.to_string());
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            let host = url
                .split("://")
                .nth(1)
                .and_then(|rest| rest.split(['/', '?', '#']).next())
                .unwrap_or_default();
            return Some(format!(
                "<html><head><title>{host}</title></head><body></body></html>"
            ));
        }
        None
    }

    fn run_script(&mut self, script: &Script, args: &[Value]) -> Result<Value, EngineError> {
        if !self.scripts_enabled() {
            return Ok(Value::Null);
        }
        self.emit_console(script.as_str());
        (self.evaluator)(script.as_str(), args, &self.view)
    }

    fn emit_console(&self, source: &str) {
        for message in console_messages(source) {
            self.events.emit(
                EngineEvent::ConsoleMessage,
                vec![json!(message), json!(0), json!("")],
            );
        }
    }

    fn scripts_enabled(&self) -> bool {
        self.settings_flag("javascriptEnabled") != Some(false)
    }

    fn settings_flag(&self, key: &str) -> Option<bool> {
        self.properties.get("settings")?.get(key)?.as_bool()
    }
}

impl PropertyTarget for MemoryPage {
    fn property(&self, key: &str) -> Result<Value, EngineError> {
        Ok(match key {
            "url" | "frameUrl" => json!(self.view.url),
            "title" | "frameTitle" => json!(self.view.title),
            "content" | "frameContent" => json!(self.view.content),
            "plainText" | "framePlainText" => json!(strip_tags(&self.view.content)),
            "libraryPath" => json!(self.library_path.display().to_string()),
            "cookies" => Value::Array(self.cookies.clone()),
            _ => self.properties.get(key).cloned().unwrap_or(Value::Null),
        })
    }

    fn set_property(&mut self, key: &str, value: Value) -> Result<(), EngineError> {
        match key {
            "url" | "frameUrl" | "title" | "frameTitle" | "plainText" | "framePlainText" => {
                Err(EngineError::ReadOnly(key.into()))
            }
            "content" | "frameContent" => {
                let content = value
                    .as_str()
                    .ok_or_else(|| EngineError::invalid("set", "content must be a string"))?;
                self.set_content(content.to_string());
                Ok(())
            }
            "libraryPath" => {
                let path = value
                    .as_str()
                    .ok_or_else(|| EngineError::invalid("set", "libraryPath must be a string"))?;
                self.library_path = PathBuf::from(path);
                Ok(())
            }
            "cookies" => {
                self.cookies = cookie_list(value)?;
                Ok(())
            }
            _ => {
                self.properties.insert(key.into(), value);
                Ok(())
            }
        }
    }
}

impl CookieJar for MemoryPage {
    fn add_cookie(&mut self, cookie: &Value) -> Result<bool, EngineError> {
        Ok(add_to_jar(&mut self.cookies, cookie))
    }

    fn delete_cookie(&mut self, name: &str) -> Result<bool, EngineError> {
        Ok(delete_from_jar(&mut self.cookies, name))
    }

    fn clear_cookies(&mut self) -> Result<(), EngineError> {
        self.cookies.clear();
        Ok(())
    }
}

impl EnginePage for MemoryPage {
    fn open(&mut self, url: &str) -> Completion<String> {
        self.events.emit(
            EngineEvent::NavigationRequested,
            vec![json!(url), json!("Other"), json!(true), json!(true)],
        );
        self.events.emit(EngineEvent::LoadStarted, vec![]);

        let status = match self.load(url) {
            Some(content) => {
                self.view.url = url.to_string();
                self.set_content(content);
                self.events.emit(EngineEvent::UrlChanged, vec![json!(url)]);
                self.events.emit(EngineEvent::Initialized, vec![]);
                "success"
            }
            None => "fail",
        };
        self.events.emit(EngineEvent::LoadFinished, vec![json!(status)]);

        async move {
            tokio::task::yield_now().await;
            Ok(status.to_string())
        }
        .boxed()
    }

    fn include_js(&mut self, url: &str) -> Completion<()> {
        let loaded = url.starts_with("http://") || url.starts_with("https://");
        let url = url.to_string();
        let events = self.events.clone();
        async move {
            tokio::task::yield_now().await;
            if !loaded {
                events.emit(
                    EngineEvent::Error,
                    vec![json!(format!("failed to load script {url}")), json!([])],
                );
            }
            Ok(())
        }
        .boxed()
    }

    fn evaluate(&mut self, script: &Script, args: &[Value]) -> Result<Value, EngineError> {
        self.run_script(script, args)
    }

    fn evaluate_async(&mut self, script: &Script) -> Result<(), EngineError> {
        if let Err(e) = self.run_script(script, &[]) {
            self.events
                .emit(EngineEvent::Error, vec![json!(e.to_string()), json!([])]);
        }
        Ok(())
    }

    fn inject_js(&mut self, path: &str) -> Result<bool, EngineError> {
        let resolved = resolve_path(&self.library_path, path);
        match std::fs::read_to_string(&resolved) {
            // Injected files are plain scripts, not functions: they are
            // never handed to the evaluator.
            Ok(source) => {
                if self.scripts_enabled() {
                    self.emit_console(&source);
                }
                self.injected.push(resolved);
                Ok(true)
            }
            Err(e) => {
                tracing::debug!(path = %resolved.display(), error = %e, "script not injected");
                Ok(false)
            }
        }
    }

    fn render(&mut self, path: &str) -> Result<(), EngineError> {
        let format = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png");
        let bytes = image_bytes(format)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn render_base64(&mut self, format: &str) -> Result<String, EngineError> {
        Ok(BASE64.encode(image_bytes(format)?))
    }

    fn send_event(&mut self, kind: &str, _args: &[Value]) -> Result<(), EngineError> {
        if INPUT_EVENTS.contains(&kind) {
            Ok(())
        } else {
            Err(EngineError::invalid("sendEvent", format!("unknown event type '{kind}'")))
        }
    }

    fn upload_file(&mut self, selector: &str, path: &str) -> Result<(), EngineError> {
        if selector.is_empty() {
            return Err(EngineError::invalid("uploadFile", "empty selector"));
        }
        std::fs::metadata(path)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if !self.closed {
            self.closed = true;
            self.events.emit(EngineEvent::Closing, vec![]);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn version() -> Value {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse::<u64>().unwrap_or(0));
    json!({
        "major": parts.next().unwrap_or(0),
        "minor": parts.next().unwrap_or(0),
        "patch": parts.next().unwrap_or(0),
    })
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn image_bytes(format: &str) -> Result<&'static [u8], EngineError> {
    match format.to_ascii_lowercase().as_str() {
        "png" => Ok(BLANK_PNG),
        other => Err(EngineError::Unsupported(format!("render format '{other}'"))),
    }
}

fn cookie_name(cookie: &Value) -> Option<&str> {
    cookie.get("name")?.as_str()
}

fn add_to_jar(jar: &mut Vec<Value>, cookie: &Value) -> bool {
    let Some(name) = cookie_name(cookie) else {
        return false;
    };
    if !cookie.get("value").is_some_and(Value::is_string) {
        return false;
    }
    let name = name.to_string();
    jar.retain(|c| cookie_name(c) != Some(name.as_str()));
    jar.push(cookie.clone());
    true
}

fn delete_from_jar(jar: &mut Vec<Value>, name: &str) -> bool {
    let before = jar.len();
    jar.retain(|c| cookie_name(c) != Some(name));
    jar.len() != before
}

fn cookie_list(value: Value) -> Result<Vec<Value>, EngineError> {
    match value {
        Value::Array(cookies) => Ok(cookies
            .into_iter()
            .filter(|c| cookie_name(c).is_some())
            .collect()),
        _ => Err(EngineError::invalid("set", "cookies must be an array")),
    }
}

fn extract_title(content: &str) -> String {
    let lower = content.to_ascii_lowercase();
    let Some(open) = lower.find("<title>") else {
        return String::new();
    };
    let start = open + "<title>".len();
    match lower[start..].find("</title>") {
        Some(len) => content[start..start + len].trim().to_string(),
        None => String::new(),
    }
}

fn strip_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Arguments of every `console.log(<literal>)` call in `source`.
fn console_messages(source: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut rest = source;
    while let Some(pos) = rest.find("console.log(") {
        rest = &rest[pos + "console.log(".len()..];
        let Some(end) = rest.find(')') else {
            break;
        };
        let arg = rest[..end].trim();
        let message = match serde_json::from_str::<Value>(arg) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(_) => arg.trim_matches('\'').to_string(),
        };
        messages.push(message);
        rest = &rest[end..];
    }
    messages
}

/// Default evaluator for the memory engine.
///
/// Understands `function (a, b) { ...; return <expr>; }` where `<expr>` is
/// one of: a parameter name, `document.title`, `document.location.href` /
/// `window.location.href` / `location.href`, `document.documentElement.outerHTML`,
/// or a JSON literal. A function without `return` yields `null`.
pub fn builtin_evaluate(
    source: &str,
    args: &[Value],
    page: &PageView,
) -> Result<Value, EngineError> {
    let source = source.trim();
    let params: Vec<&str> = source
        .find('(')
        .and_then(|open| {
            let close = source[open..].find(')')? + open;
            Some(
                source[open + 1..close]
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .collect(),
            )
        })
        .unwrap_or_default();

    let body = match (source.find('{'), source.rfind('}')) {
        (Some(open), Some(close)) if open < close => &source[open + 1..close],
        _ => return Err(EngineError::Script(format!("not a function: {source}"))),
    };
    let Some(ret) = body.rfind("return") else {
        return Ok(Value::Null);
    };
    let expr = body[ret + "return".len()..]
        .trim()
        .trim_end_matches(';')
        .trim();

    if let Some(index) = params.iter().position(|p| *p == expr) {
        return Ok(args.get(index).cloned().unwrap_or(Value::Null));
    }
    match expr {
        "document.title" => Ok(json!(page.title)),
        "document.location.href" | "window.location.href" | "location.href" => Ok(json!(page.url)),
        "document.documentElement.outerHTML" => Ok(json!(page.content)),
        "document.body.innerText" => Ok(json!(strip_tags(&page.content))),
        "undefined" => Ok(Value::Null),
        _ => serde_json::from_str(expr)
            .map_err(|_| EngineError::Script(format!("cannot evaluate '{expr}'"))),
    }
}
