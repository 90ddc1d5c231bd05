//! The wire envelope and its JSON codec.
//!
//! Every message exchanged between controller and executor is one JSON
//! object carried in one transport frame:
//!
//! ```json
//! {"page": "hive-1", "command_id": 3, "command": "createPage", "args": []}
//! {"page": 7, "command_id": -1, "command": "loadFinished", "args": ["success"]}
//! ```
//!
//! `page` names either the session (a string) or one of its pages (a
//! number). `command_id` is the correlation id, `-1` for unsolicited events.
//! A response carries the same `page`, `command_id` and `command` as its
//! request; an executor-side fault adds an `error` string.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::HiveError;
use crate::ids::{CorrelationId, EntityId, SessionId};

/// Failure to turn a transport frame into an [`Envelope`].
///
/// Never sent back over the channel: the receiving endpoint logs it and
/// drops the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid envelope: {0}")]
    Invalid(String),
}

/// The addressee of an envelope: the session itself or one of its pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    /// A page (sub-entity), encoded as a JSON number.
    Entity(EntityId),
    /// The session, encoded as a JSON string.
    Session(SessionId),
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Entity(id) => write!(f, "{id}"),
            PageRef::Session(id) => write!(f, "{id}"),
        }
    }
}

impl From<EntityId> for PageRef {
    fn from(id: EntityId) -> Self {
        PageRef::Entity(id)
    }
}

impl From<SessionId> for PageRef {
    fn from(id: SessionId) -> Self {
        PageRef::Session(id)
    }
}

/// Function source text shipped to the executor for evaluation.
///
/// The bridge never interprets it; the engine reconstitutes and runs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(String);

impl Script {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Script {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Script {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Script> for Value {
    fn from(script: Script) -> Self {
        Value::String(script.0)
    }
}

/// One correlated message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Session or page this envelope is addressed to (or emitted by).
    pub page: PageRef,
    /// Correlation id; [`CorrelationId::EVENT`] for unsolicited events.
    pub command_id: CorrelationId,
    /// Operation or event name.
    pub command: String,
    /// Positional arguments (request) or results (response).
    #[serde(default)]
    pub args: Vec<Value>,
    /// Executor-side failure description, present only on faulted responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(
        page: impl Into<PageRef>,
        command_id: CorrelationId,
        command: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            page: page.into(),
            command_id,
            command: command.into(),
            args,
            error: None,
        }
    }

    /// Build an unsolicited event envelope.
    pub fn event(page: impl Into<PageRef>, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::request(page, CorrelationId::EVENT, name, args)
    }

    /// Build the successful response to this request.
    pub fn reply(&self, args: Vec<Value>) -> Self {
        Self {
            page: self.page.clone(),
            command_id: self.command_id,
            command: self.command.clone(),
            args,
            error: None,
        }
    }

    /// Build the faulted response to this request.
    pub fn fault(&self, message: impl Into<String>) -> Self {
        Self {
            page: self.page.clone(),
            command_id: self.command_id,
            command: self.command.clone(),
            args: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Whether this envelope is an unsolicited event.
    pub fn is_event(&self) -> bool {
        self.command_id.is_event()
    }

    /// Serialize to a single JSON text frame.
    pub fn encode(&self) -> Result<String, HiveError> {
        serde_json::to_string(self).map_err(|e| HiveError::Encode(e.to_string()))
    }

    /// Parse a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let envelope: Envelope =
            serde_json::from_value(value).map_err(|e| DecodeError::Invalid(e.to_string()))?;
        if envelope.command.is_empty() {
            return Err(DecodeError::Invalid("empty command name".into()));
        }
        if envelope.command_id.0 < CorrelationId::EVENT.0 {
            return Err(DecodeError::Invalid(format!(
                "correlation id {} is below the event sentinel",
                envelope.command_id
            )));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_session_request() {
        let env = Envelope::decode(
            r#"{"page":"hive-1","command_id":1,"command":"createPage","args":[]}"#,
        )
        .unwrap();
        assert_eq!(env.page, PageRef::Session(SessionId::new("hive-1")));
        assert_eq!(env.command_id, CorrelationId(1));
        assert_eq!(env.command, "createPage");
        assert!(env.args.is_empty());
        assert!(env.error.is_none());
    }

    #[test]
    fn decodes_page_event() {
        let env = Envelope::decode(
            r#"{"page":7,"command_id":-1,"command":"loadFinished","args":["success"]}"#,
        )
        .unwrap();
        assert_eq!(env.page, PageRef::Entity(EntityId(7)));
        assert!(env.is_event());
        assert_eq!(env.args, vec![json!("success")]);
    }

    #[test]
    fn missing_args_default_to_empty() {
        let env = Envelope::decode(r#"{"page":3,"command_id":4,"command":"close"}"#).unwrap();
        assert!(env.args.is_empty());
    }

    #[test]
    fn nested_arguments_survive_encoding() {
        let env = Envelope::request(
            EntityId(2),
            CorrelationId(9),
            "set",
            vec![json!({"settings": {"userAgent": "x", "loadImages": false}, "zoomFactor": 1.5})],
        );
        let back = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn error_field_is_omitted_when_absent() {
        let env = Envelope::request(EntityId(1), CorrelationId(1), "close", vec![]);
        let text = env.encode().unwrap();
        assert!(!text.contains("error"));

        let faulted = env.fault("page is gone");
        let text = faulted.encode().unwrap();
        assert!(text.contains("\"error\":\"page is gone\""));
    }

    #[test]
    fn reply_keeps_routing_fields() {
        let req = Envelope::request(EntityId(7), CorrelationId(2), "get", vec![json!("url")]);
        let resp = req.reply(vec![json!("http://example.com")]);
        assert_eq!(resp.page, req.page);
        assert_eq!(resp.command_id, req.command_id);
        assert_eq!(resp.command, "get");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Envelope::decode("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn rejects_missing_fields() {
        let err = Envelope::decode(r#"{"page":1,"command":"open"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn rejects_empty_command() {
        let err = Envelope::decode(r#"{"page":1,"command_id":1,"command":""}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn rejects_ids_below_sentinel() {
        let err = Envelope::decode(r#"{"page":1,"command_id":-5,"command":"open"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_page_numbers() {
        let err = Envelope::decode(r#"{"page":-2,"command_id":1,"command":"open"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }

    #[test]
    fn script_is_plain_text_on_the_wire() {
        let script = Script::from("function () { return document.title; }");
        assert_eq!(
            Value::from(script),
            json!("function () { return document.title; }")
        );
    }
}
