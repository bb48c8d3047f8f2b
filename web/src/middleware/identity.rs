use crate::error::{Error, WebErrorKind};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use events::StudentId;
use log::*;

/// Header carrying the authenticated student's id, set by the authenticating proxy.
pub const STUDENT_ID_HEADER: &str = "x-student-id";
/// Header carrying the authenticated administrator's username, set by the authenticating proxy.
pub const ADMIN_USER_HEADER: &str = "x-admin-user";

/// An identity established by the HTTP layer in front of this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Student(StudentId),
    Admin(String),
}

/// Attaches an [`Identity`] to the request when identity headers are trusted.
///
/// With `trust_identity_headers` off nothing is attached and every
/// identity-bearing route answers 401.
pub async fn resolve_identity(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if app_state.config.trust_identity_headers {
        match identity_from_headers(request.headers()) {
            Ok(Some(identity)) => {
                trace!("Resolved identity {identity:?}");
                request.extensions_mut().insert(identity);
            }
            Ok(None) => {}
            Err(e) => return e.into_response(),
        }
    }

    next.run(request).await
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Option<Identity>, Error> {
    let student = header_str(headers, STUDENT_ID_HEADER)?;
    let admin = header_str(headers, ADMIN_USER_HEADER)?;

    match (student, admin) {
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(Error::new(WebErrorKind::BadRequest(
            "request carries both a student and an admin identity".to_string(),
        ))),
        (Some(student_id), None) => student_id
            .parse::<StudentId>()
            .map(|id| Some(Identity::Student(id)))
            .map_err(|e| Error {
                source: Some(Box::new(e)),
                error_kind: WebErrorKind::BadRequest(format!(
                    "{STUDENT_ID_HEADER} is not a numeric id"
                )),
            }),
        (None, Some(username)) => Ok(Some(Identity::Admin(username.to_string()))),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, Error> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: WebErrorKind::BadRequest(format!("{name} is not valid text")),
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then_some(value))
}
