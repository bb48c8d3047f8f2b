use crate::extractors::authenticated_identity::AuthenticatedStudent;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use events::StudentId;
use futures::{SinkExt, StreamExt};
use hub::transport::{Encoder, WebSocketEncoder};
use hub::{pump, AudienceKey, Event, Manager};
use log::*;
use service::AppState;

/// WebSocket handler for students. Handshake failures are answered by the
/// upgrade extractor before this runs.
pub(crate) async fn websocket_handler(
    AuthenticatedStudent(student_id): AuthenticatedStudent,
    State(app_state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    debug!("Upgrading live-update WebSocket for student {student_id}");
    let manager = app_state.live_manager.clone();

    ws.on_failed_upgrade(move |e| {
        warn!("WebSocket upgrade for student {student_id} failed: {e}");
    })
    .on_upgrade(move |socket| serve_socket(socket, manager, student_id))
}

async fn serve_socket(socket: WebSocket, manager: Manager, student_id: StudentId) {
    let subscription = manager.register_connection(AudienceKey::Student(student_id));
    let (mut sink, inbound) = socket.split();

    // Greet before the pumps start; anything published meanwhile waits in the queue.
    let greeting = match WebSocketEncoder.encode(&Event::hello()) {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to encode WebSocket greeting: {e}");
            manager.unregister_connection(&subscription.connection_id);
            return;
        }
    };
    if let Err(e) = sink.send(greeting).await {
        warn!(
            "Failed to greet student {student_id} on connection {}: {e}",
            subscription.connection_id
        );
        manager.unregister_connection(&subscription.connection_id);
        let _ = sink.close().await;
        return;
    }

    info!(
        "WebSocket connection {} established for student {student_id}",
        subscription.connection_id
    );
    pump::run_connection(manager, subscription, sink, inbound, WebSocketEncoder).await;
}
