//! Live-update HTTP handlers for the web layer.
//!
//! This module contains only the Axum handlers that upgrade a request and hand
//! the connection to the hub. The hub itself (Manager, registry, pumps,
//! encoders) lives in the `hub` crate.

pub(crate) mod sse_handler;
pub(crate) mod websocket_handler;
