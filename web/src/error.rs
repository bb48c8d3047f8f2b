use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hub::error::{Error as HubError, ErrorKind as HubErrorKind};
use log::*;

/// Request-level error returned by web handlers and extractors.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: WebErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    /// No authenticated identity accompanied the request.
    Unauthenticated,
    /// The identity is not allowed to use this endpoint.
    Forbidden,
    /// The request itself was malformed (e.g. an unparsable identity header).
    BadRequest(String),
    /// The request was well formed but its content cannot be published.
    Unprocessable(String),
    Internal,
}

impl Error {
    pub fn new(error_kind: WebErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
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

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.error_kind {
            WebErrorKind::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED").into_response()
            }
            WebErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN").into_response(),
            WebErrorKind::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, reason).into_response()
            }
            WebErrorKind::Unprocessable(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason).into_response()
            }
            WebErrorKind::Internal => {
                error!("Internal error: {:?}", self.source);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

// Translate hub errors at the web layer boundary.
impl From<HubError> for Error {
    fn from(err: HubError) -> Self {
        let error_kind = match &err.error_kind {
            HubErrorKind::InvalidEvent(reason) => WebErrorKind::Unprocessable(reason.clone()),
            HubErrorKind::Encode(_) | HubErrorKind::Transport => WebErrorKind::Internal,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
