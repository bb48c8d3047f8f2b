//! Live-update notification hub.
//!
//! Pushes state-change events from request handlers to connected browsers
//! over WebSocket or Server-Sent Events.
//!
//! # Architecture
//!
//! - **Single control loop**: the [`Manager`] handle submits every register,
//!   unregister and publish request to one task that owns the registration
//!   table, so the table needs no locking and requests apply in submission
//!   order.
//! - **Audience keys**: connections register as a specific student or as
//!   `Unfiltered` (admin streams). Publishes are either a broadcast to every
//!   connection or a targeted send to a list of keys.
//! - **Bounded per-connection queues**: the hub only ever `try_send`s. A full
//!   queue drops the incoming event for that one connection and logs a
//!   warning; the publisher never waits and never sees an error.
//! - **Ephemeral messages**: nothing is persisted or replayed. A client that
//!   missed events re-fetches authoritative state on reconnect.
//! - **Transport-agnostic events**: an [`Event`] is a `(kind, payload)` pair;
//!   the connection's [`transport::Encoder`] renders it as a JSON WebSocket
//!   text frame or an SSE block.
//!
//! # Message Flow
//!
//! 1. The web layer authenticates a request and upgrades it.
//! 2. `Manager::register_connection` returns a [`Subscription`] holding the
//!    connection's queue.
//! 3. The pump pair ([`pump::run_connection`]) or the SSE response stream
//!    ([`pump::sse_stream`]) drains the queue onto the wire.
//! 4. After a committed mutation a producer publishes a domain event; the
//!    [`domain_event_handler::LiveUpdateEventHandler`] decides the audience and
//!    calls `broadcast`/`broadcast_to`.
//! 5. On disconnect, read or write failure, or a dropped response, the
//!    connection is unregistered and its queue released.
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! use hub::{AudienceKey, Event, Resource};
//!
//! app_state.live_manager.broadcast_to(
//!     vec![AudienceKey::Student(student_id)],
//!     Event::invalidate(Resource::Selections),
//! );
//! ```

pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod manager;
pub mod message;
pub mod pump;
pub mod transport;

pub use connection::{AudienceKey, ConnectionId, Subscription};
pub use manager::{HubStats, Manager};
pub use message::{kind, Event, Message, MessageScope, Resource};
