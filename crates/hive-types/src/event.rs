//! Engine lifecycle and interaction events forwarded as unsolicited
//! envelopes.
//!
//! Engines name their callbacks `onLoadFinished`, `onConsoleMessage`, ...;
//! on the wire the event carries the lower-camel-cased name without the
//! `on` prefix (`loadFinished`). Uncaught script errors travel as
//! `jsError` so they never collide with a literal `error` passthrough.

use std::fmt;

/// A page event the executor forwards to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    Alert,
    Callback,
    Closing,
    Confirm,
    ConsoleMessage,
    Error,
    Initialized,
    LoadFinished,
    LoadStarted,
    NavigationRequested,
    Prompt,
    ResourceRequested,
    ResourceReceived,
    UrlChanged,
}

impl EngineEvent {
    pub const ALL: [EngineEvent; 14] = [
        EngineEvent::Alert,
        EngineEvent::Callback,
        EngineEvent::Closing,
        EngineEvent::Confirm,
        EngineEvent::ConsoleMessage,
        EngineEvent::Error,
        EngineEvent::Initialized,
        EngineEvent::LoadFinished,
        EngineEvent::LoadStarted,
        EngineEvent::NavigationRequested,
        EngineEvent::Prompt,
        EngineEvent::ResourceRequested,
        EngineEvent::ResourceReceived,
        EngineEvent::UrlChanged,
    ];

    /// The engine-side callback name (`onLoadFinished`).
    pub fn callback_name(self) -> &'static str {
        match self {
            EngineEvent::Alert => "onAlert",
            EngineEvent::Callback => "onCallback",
            EngineEvent::Closing => "onClosing",
            EngineEvent::Confirm => "onConfirm",
            EngineEvent::ConsoleMessage => "onConsoleMessage",
            EngineEvent::Error => "onError",
            EngineEvent::Initialized => "onInitialized",
            EngineEvent::LoadFinished => "onLoadFinished",
            EngineEvent::LoadStarted => "onLoadStarted",
            EngineEvent::NavigationRequested => "onNavigationRequested",
            EngineEvent::Prompt => "onPrompt",
            EngineEvent::ResourceRequested => "onResourceRequested",
            EngineEvent::ResourceReceived => "onResourceReceived",
            EngineEvent::UrlChanged => "onUrlChanged",
        }
    }

    /// The name carried on the wire and used by controller listeners.
    pub fn wire_name(self) -> &'static str {
        match self {
            EngineEvent::Alert => "alert",
            EngineEvent::Callback => "callback",
            EngineEvent::Closing => "closing",
            EngineEvent::Confirm => "confirm",
            EngineEvent::ConsoleMessage => "consoleMessage",
            EngineEvent::Error => "jsError",
            EngineEvent::Initialized => "initialized",
            EngineEvent::LoadFinished => "loadFinished",
            EngineEvent::LoadStarted => "loadStarted",
            EngineEvent::NavigationRequested => "navigationRequested",
            EngineEvent::Prompt => "prompt",
            EngineEvent::ResourceRequested => "resourceRequested",
            EngineEvent::ResourceReceived => "resourceReceived",
            EngineEvent::UrlChanged => "urlChanged",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.wire_name() == name)
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Translate an engine callback name into its wire event name.
///
/// `onError` becomes `jsError`; any other `onXxx` becomes `xxx` with the
/// first letter lowered. Names without the `on` prefix pass through, so
/// already-translated names are left alone.
pub fn event_name_for_callback(name: &str) -> String {
    if name == "onError" {
        return EngineEvent::Error.wire_name().to_string();
    }
    let Some(rest) = name.strip_prefix("on") else {
        return name.to_string();
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            let mut out = String::with_capacity(rest.len());
            out.push(first.to_ascii_lowercase());
            out.push_str(chars.as_str());
            out
        }
        _ => name.to_string(),
    }
}
