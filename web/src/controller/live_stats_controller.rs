use crate::extractors::authenticated_identity::AuthenticatedAdmin;
use axum::extract::State;
use axum::Json;
use hub::HubStats;
use service::AppState;

/// GET the live-update hub's connection counts and delivery counters.
pub async fn read(
    AuthenticatedAdmin(_username): AuthenticatedAdmin,
    State(app_state): State<AppState>,
) -> Json<HubStats> {
    Json(app_state.live_manager.stats().await)
}
