//! Core types shared across all hive crates.
//!
//! Defines the wire [`Envelope`] and its codec, the identifiers that route
//! envelopes between controller and executor, the closed command and event
//! vocabularies, configuration, and the error type used by the controller
//! bridge and the executor dispatcher.

pub mod command;
pub mod config;
pub mod cookie;
pub mod envelope;
pub mod error;
pub mod event;
pub mod ids;

pub use command::{PageCommand, SessionCommand};
pub use config::{BridgeConfig, ExecutorConfig, ListenConfig, CONFIG_FILENAME};
pub use cookie::Cookie;
pub use envelope::{DecodeError, Envelope, PageRef, Script};
pub use error::HiveError;
pub use event::{event_name_for_callback, EngineEvent};
pub use ids::{CorrelationId, EntityId, SessionId};
