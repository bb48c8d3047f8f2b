//! Wire encodings for live-update events.
//!
//! A connection picks its encoder once, when it registers; producers never
//! see which transport a subscriber is using.

use crate::error::Error;
use crate::message::Event;
use axum::extract::ws::Message as WsFrame;
use axum::response::sse::Event as SseFrame;
use serde::Serialize;

/// Turns an [`Event`] into the frame type a transport writes.
pub trait Encoder: Send + Sync + 'static {
    type Frame: Send + 'static;

    fn encode(&self, event: &Event) -> Result<Self::Frame, Error>;
}

#[derive(Serialize)]
struct WireEvent<'a> {
    kind: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    payload: &'a str,
}

fn is_empty(value: &&str) -> bool {
    value.is_empty()
}

/// One JSON text frame per event: `{"kind":"...","payload":"..."}`.
///
/// `payload` is left out when empty. Keeping the two fields separate means a
/// comma inside a payload never has to be escaped or guessed at.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketEncoder;

impl WebSocketEncoder {
    pub fn encode_text(&self, event: &Event) -> Result<String, Error> {
        Ok(serde_json::to_string(&WireEvent {
            kind: event.kind(),
            payload: event.payload(),
        })?)
    }
}

impl Encoder for WebSocketEncoder {
    type Frame = WsFrame;

    fn encode(&self, event: &Event) -> Result<WsFrame, Error> {
        Ok(WsFrame::Text(self.encode_text(event)?.into()))
    }
}

/// `event: <kind>` / `data: <payload>` blocks.
///
/// Empty fields are left out; the terminating blank line is always written.
#[derive(Debug, Default, Clone, Copy)]
pub struct SseEncoder;

impl Encoder for SseEncoder {
    type Frame = SseFrame;

    fn encode(&self, event: &Event) -> Result<SseFrame, Error> {
        let mut frame = SseFrame::default();
        if !event.kind().is_empty() {
            frame = frame.event(event.kind());
        }
        if !event.payload().is_empty() {
            frame = frame.data(event.payload());
        }
        Ok(frame)
    }
}
