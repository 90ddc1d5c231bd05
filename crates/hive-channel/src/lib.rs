//! Duplex envelope channel between a controller and an executor.
//!
//! A [`Channel`] is the outbound half: a cheap, clonable handle every entity
//! of one session shares to send envelopes. The inbound half is a plain
//! receiver drained by exactly one routing task per endpoint, which keeps
//! delivery in arrival order.
//!
//! Transports:
//!
//! - [`memory_pair`]: two linked in-process endpoints (tests, embedding)
//! - [`ws::connect`]: WebSocket client used by the executor to dial back
//! - [`ws::attach`]: wraps an accepted axum WebSocket on the controller side

pub mod channel;
pub mod ws;

pub use channel::{memory_pair, Channel, Endpoint, Inbound};
