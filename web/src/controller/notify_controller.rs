use crate::error::{Error, WebErrorKind};
use crate::extractors::authenticated_identity::AuthenticatedAdmin;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect};
use axum::Form;
use events::DomainEvent;
use hub::{kind, Event};
use log::*;
use serde::Deserialize;
use service::AppState;

#[derive(Debug, Deserialize)]
pub struct NotifyParams {
    pub text: String,
}

/// POST a notification that every connected client displays.
///
/// Answers 422 for empty or multi-line text, since the message travels in a
/// single line on the wire.
pub async fn create(
    AuthenticatedAdmin(username): AuthenticatedAdmin,
    State(app_state): State<AppState>,
    Form(params): Form<NotifyParams>,
) -> Result<impl IntoResponse, Error> {
    let message = params.text.trim();
    if message.is_empty() {
        return Err(Error::new(WebErrorKind::Unprocessable(
            "notification text is empty".to_string(),
        )));
    }
    Event::try_new(kind::NOTIFY, message)?;

    info!("Admin {username} is broadcasting a notification");
    app_state
        .event_publisher
        .publish(DomainEvent::AdminNotification {
            message: message.to_string(),
        })
        .await;

    Ok(Redirect::to("/admin/notify"))
}
