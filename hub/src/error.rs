//! Error types for the `hub` crate.
use std::error::Error as StdError;
use std::fmt;

/// Errors raised by the live-update hub.
///
/// None of these ever reach an event producer: invalid events are rejected at
/// construction time, and transport failures are handled by the connection
/// that hit them.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// An event broke the line-oriented wire invariants.
    InvalidEvent(String),
    /// An event could not be rendered into a wire frame.
    Encode(String),
    /// Writing to or reading from a connection failed.
    Transport,
}

impl Error {
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::InvalidEvent(reason.into()),
        }
    }

    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error {
            source: Some(err.into()),
            error_kind: ErrorKind::Transport,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::InvalidEvent(reason) => write!(f, "invalid event: {reason}"),
            ErrorKind::Encode(reason) => write!(f, "failed to encode event: {reason}"),
            ErrorKind::Transport => match &self.source {
                Some(source) => write!(f, "transport error: {source}"),
                None => write!(f, "transport error"),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            error_kind: ErrorKind::Encode(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}
