use crate::{
    controller::{health_check_controller, live_stats_controller, notify_controller},
    live::{sse_handler, websocket_handler},
    middleware::identity::resolve_identity,
    AppState,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use service::config::LiveTransport;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(student_live_routes(app_state.clone()))
        .merge(admin_routes(app_state.clone()))
        .layer(from_fn_with_state(app_state, resolve_identity))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

/// The student endpoint speaks whichever transport the deployment selected.
fn student_live_routes(app_state: AppState) -> Router {
    let handler = match app_state.config.student_transport {
        LiveTransport::WebSocket => get(websocket_handler::websocket_handler),
        LiveTransport::Sse => get(sse_handler::student_sse_handler),
    };

    Router::new()
        .route("/student/api/events", handler)
        .with_state(app_state)
}

fn admin_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/admin/events", get(sse_handler::admin_sse_handler))
        .route("/admin/notify", post(notify_controller::create))
        .route("/admin/live/stats", get(live_stats_controller::read))
        .with_state(app_state)
}
