use crate::error::{Error, WebErrorKind};
use crate::middleware::identity::Identity;
use axum::{extract::FromRequestParts, http::request::Parts};
use events::StudentId;
use log::*;

/// A request made by a signed-in student.
pub(crate) struct AuthenticatedStudent(pub StudentId);

/// A request made by a signed-in administrator, carrying their username.
pub(crate) struct AuthenticatedAdmin(pub String);

fn identity(parts: &Parts) -> Result<&Identity, Error> {
    parts
        .extensions
        .get::<Identity>()
        .ok_or_else(|| Error::new(WebErrorKind::Unauthenticated))
}

impl<S> FromRequestParts<S> for AuthenticatedStudent
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match identity(parts)? {
            Identity::Student(id) => Ok(AuthenticatedStudent(*id)),
            Identity::Admin(username) => {
                debug!("Admin {username} rejected from student-only route {}", parts.uri);
                Err(Error::new(WebErrorKind::Forbidden))
            }
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedAdmin
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match identity(parts)? {
            Identity::Admin(username) => Ok(AuthenticatedAdmin(username.clone())),
            Identity::Student(id) => {
                debug!("Student {id} rejected from admin-only route {}", parts.uri);
                Err(Error::new(WebErrorKind::Forbidden))
            }
        }
    }
}
