use axum::http::StatusCode;
use axum::response::IntoResponse;

/// GET whether the router is up and responding to requests
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}
