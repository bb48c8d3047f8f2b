use crate::extractors::authenticated_identity::{AuthenticatedAdmin, AuthenticatedStudent};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use hub::{pump, AudienceKey};
use log::*;
use service::AppState;
use std::convert::Infallible;
use std::time::Duration;

/// SSE handler for administrators. Receives every published event.
pub(crate) async fn admin_sse_handler(
    AuthenticatedAdmin(username): AuthenticatedAdmin,
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Establishing SSE connection for admin {username}");
    open_stream(&app_state, AudienceKey::Unfiltered)
}

/// SSE handler for students, used when the deployment serves students over SSE.
pub(crate) async fn student_sse_handler(
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    State(app_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Establishing SSE connection for student {student_id}");
    open_stream(&app_state, AudienceKey::Student(student_id))
}

// Register before the response is returned so nothing published after the
// request was accepted is missed. The stream unregisters when dropped.
fn open_stream(
    app_state: &AppState,
    audience: AudienceKey,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let manager = app_state.live_manager.clone();
    let subscription = manager.register_connection(audience);

    Sse::new(pump::sse_stream(manager, subscription)).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(app_state.config.sse_keep_alive_secs)),
    )
}
