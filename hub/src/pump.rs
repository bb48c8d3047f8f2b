//! Per-connection pumps moving events between a subscription queue and a transport.
//!
//! A WebSocket connection runs both pumps through [`run_connection`]; an SSE
//! response is send-only and uses [`sse_stream`] as its writer. Whichever way a
//! connection ends, it ends with the hub being told to unregister it.

use crate::connection::{ConnectionId, Subscription};
use crate::error::Error;
use crate::manager::Manager;
use crate::message::Event;
use crate::transport::{Encoder, SseEncoder};
use async_stream::stream;
use axum::extract::ws::Message as WsFrame;
use axum::response::sse::Event as SseFrame;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::*;
use std::convert::Infallible;
use std::error::Error as StdError;
use tokio::sync::mpsc;

/// Inbound frames are only inspected for an orderly close.
pub trait InboundFrame {
    fn is_close(&self) -> bool;
}

impl InboundFrame for WsFrame {
    fn is_close(&self) -> bool {
        matches!(self, WsFrame::Close(_))
    }
}

/// Unregisters its connection when dropped.
///
/// Held by whatever owns a connection's lifetime, so that cancellation (a
/// dropped SSE response, an aborted task) still reaches the hub.
pub struct ConnectionGuard {
    manager: Manager,
    connection_id: ConnectionId,
}

impl ConnectionGuard {
    pub fn new(manager: Manager, connection_id: ConnectionId) -> Self {
        Self {
            manager,
            connection_id,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister_connection(&self.connection_id);
    }
}

/// Drain the queue into the transport until the hub closes the queue or a write fails.
pub async fn write_pump<S, E>(
    connection_id: ConnectionId,
    mut queue: mpsc::Receiver<Event>,
    mut sink: S,
    encoder: E,
) -> Result<(), Error>
where
    E: Encoder,
    S: Sink<E::Frame> + Unpin,
    S::Error: StdError + Send + Sync + 'static,
{
    while let Some(event) = queue.recv().await {
        let frame = match encoder.encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Skipping event {event} for connection {connection_id}: {e}");
                continue;
            }
        };

        if let Err(e) = sink.send(frame).await {
            debug!("Write to connection {connection_id} failed: {e}");
            return Err(Error::transport(e));
        }
        trace!("Wrote {event} to connection {connection_id}");
    }

    debug!("Queue for connection {connection_id} closed; closing transport");
    sink.close().await.map_err(Error::transport)
}

/// Read and discard inbound frames until the peer closes or the read fails,
/// then ask the hub to unregister the connection.
pub async fn read_pump<R, F, RE>(
    connection_id: ConnectionId,
    mut inbound: R,
    manager: Manager,
) -> Result<(), Error>
where
    R: Stream<Item = Result<F, RE>> + Unpin,
    F: InboundFrame,
    RE: StdError + Send + Sync + 'static,
{
    let result = loop {
        match inbound.next().await {
            Some(Ok(frame)) if frame.is_close() => {
                debug!("Connection {connection_id} sent close frame");
                break Ok(());
            }
            Some(Ok(_)) => trace!("Discarding inbound frame on connection {connection_id}"),
            Some(Err(e)) => {
                debug!("Read from connection {connection_id} failed: {e}");
                break Err(Error::transport(e));
            }
            None => break Ok(()),
        }
    };

    manager.unregister_connection(&connection_id);
    result
}

/// Run the pump pair for one registered bidirectional connection until it closes.
pub async fn run_connection<S, R, F, RE, E>(
    manager: Manager,
    subscription: Subscription,
    sink: S,
    inbound: R,
    encoder: E,
) where
    E: Encoder,
    S: Sink<E::Frame> + Send + Unpin + 'static,
    S::Error: StdError + Send + Sync + 'static,
    R: Stream<Item = Result<F, RE>> + Send + Unpin + 'static,
    F: InboundFrame + Send + 'static,
    RE: StdError + Send + Sync + 'static,
{
    let Subscription {
        connection_id,
        receiver,
        ..
    } = subscription;
    let guard = ConnectionGuard::new(manager.clone(), connection_id.clone());

    let mut writer = tokio::spawn(write_pump(
        connection_id.clone(),
        receiver,
        sink,
        encoder,
    ));
    let mut reader = tokio::spawn(read_pump(connection_id.clone(), inbound, manager));

    tokio::select! {
        result = &mut writer => {
            log_pump_exit(&connection_id, "writer", result);
            reader.abort();
        }
        result = &mut reader => {
            log_pump_exit(&connection_id, "reader", result);
            // The writer stops once the hub has closed the queue.
            log_pump_exit(&connection_id, "writer", writer.await);
        }
    }

    drop(guard);
    info!("Live connection {connection_id} closed");
}

fn log_pump_exit(
    connection_id: &ConnectionId,
    pump: &str,
    result: Result<Result<(), Error>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => debug!("{pump} pump for connection {connection_id} finished"),
        Ok(Err(e)) => warn!("{pump} pump for connection {connection_id} stopped: {e}"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("{pump} pump for connection {connection_id} panicked: {e}"),
    }
}

/// The writer side of an SSE response. Dropping the stream unregisters the connection.
pub fn sse_stream(
    manager: Manager,
    subscription: Subscription,
) -> impl Stream<Item = Result<SseFrame, Infallible>> + Send + 'static {
    let Subscription {
        connection_id,
        mut receiver,
        ..
    } = subscription;
    let guard = ConnectionGuard::new(manager, connection_id);

    stream! {
        let guard = guard;
        while let Some(event) = receiver.recv().await {
            match SseEncoder.encode(&event) {
                Ok(frame) => {
                    yield Ok::<_, Infallible>(frame);
                }
                Err(e) => {
                    error!(
                        "Skipping event {} for connection {}: {}",
                        event,
                        guard.connection_id(),
                        e
                    );
                }
            }
        }
        debug!("Queue for SSE connection {} closed", guard.connection_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AudienceKey;
    use crate::message::Resource;
    use crate::transport::WebSocketEncoder;
    use futures::channel::mpsc as channel;
    use std::io;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(2);

    async fn wait_for_connections(manager: &Manager, expected: usize) {
        timeout(WAIT, async {
            while manager.stats().await.connections != expected {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }

    fn text(frame: WsFrame) -> String {
        match frame {
            WsFrame::Text(text) => text.as_str().to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_forwards_queued_events_and_closes_with_the_queue() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (sink, mut wire) = channel::unbounded::<WsFrame>();

        queue_tx.send(Event::notify("a")).await.unwrap();
        queue_tx.send(Event::notify("b")).await.unwrap();
        drop(queue_tx);

        write_pump(ConnectionId::new(), queue_rx, sink, WebSocketEncoder)
            .await
            .unwrap();

        assert_eq!(text(wire.next().await.unwrap()), r#"{"kind":"notify","payload":"a"}"#);
        assert_eq!(text(wire.next().await.unwrap()), r#"{"kind":"notify","payload":"b"}"#);
        assert!(wire.next().await.is_none());
    }

    #[tokio::test]
    async fn writer_stops_on_write_error() {
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let (sink, wire) = channel::unbounded::<WsFrame>();
        drop(wire);

        queue_tx.send(Event::hello()).await.unwrap();
        let result = write_pump(ConnectionId::new(), queue_rx, sink, WebSocketEncoder).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reader_unregisters_on_read_error() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Student(3));
        wait_for_connections(&manager, 1).await;

        let (inbound_tx, inbound) = channel::unbounded::<Result<WsFrame, io::Error>>();
        inbound_tx
            .unbounded_send(Ok(WsFrame::Text("ignored".into())))
            .unwrap();
        inbound_tx
            .unbounded_send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .unwrap();

        let result = read_pump(subscription.connection_id.clone(), inbound, manager.clone()).await;

        assert!(result.is_err());
        wait_for_connections(&manager, 0).await;
    }

    #[tokio::test]
    async fn connection_delivers_then_tears_down_on_close_frame() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Student(42));
        let (sink, mut wire) = channel::unbounded::<WsFrame>();
        let (inbound_tx, inbound) = channel::unbounded::<Result<WsFrame, io::Error>>();

        let connection = tokio::spawn(run_connection(
            manager.clone(),
            subscription,
            sink,
            inbound,
            WebSocketEncoder,
        ));

        manager.broadcast_to_students(&[42], Event::invalidate(Resource::Selections));
        let frame = timeout(WAIT, wire.next()).await.unwrap().unwrap();
        assert_eq!(text(frame), r#"{"kind":"invalidate_selections"}"#);

        inbound_tx.unbounded_send(Ok(WsFrame::Close(None))).unwrap();
        timeout(WAIT, connection).await.unwrap().unwrap();

        assert!(timeout(WAIT, wire.next()).await.unwrap().is_none());
        assert_eq!(manager.stats().await.connections, 0);
    }

    #[tokio::test]
    async fn write_failure_mid_stream_unregisters_the_connection() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Student(7));
        let (sink, wire) = channel::unbounded::<WsFrame>();
        let (_inbound_tx, inbound) = channel::unbounded::<Result<WsFrame, io::Error>>();

        let connection = tokio::spawn(run_connection(
            manager.clone(),
            subscription,
            sink,
            inbound,
            WebSocketEncoder,
        ));
        wait_for_connections(&manager, 1).await;

        drop(wire);
        manager.broadcast_to_students(&[7], Event::invalidate(Resource::Grades));
        timeout(WAIT, connection).await.unwrap().unwrap();

        wait_for_connections(&manager, 0).await;
        manager.broadcast_to_students(&[7], Event::invalidate(Resource::Grades));
        let stats = manager.stats().await;
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn sse_stream_yields_frames_and_unregisters_when_dropped() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Unfiltered);
        let mut events = Box::pin(sse_stream(manager.clone(), subscription));

        manager.broadcast(Event::invalidate(Resource::Categories));
        let frame = timeout(WAIT, events.next()).await.unwrap();
        assert!(matches!(frame, Some(Ok(_))));
        assert_eq!(manager.stats().await.connections, 1);

        drop(events);
        wait_for_connections(&manager, 0).await;
    }

    #[tokio::test]
    async fn sse_stream_ends_when_the_hub_unregisters() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Student(1));
        let connection_id = subscription.connection_id.clone();
        let mut events = Box::pin(sse_stream(manager.clone(), subscription));

        manager.unregister_connection(&connection_id);

        assert!(timeout(WAIT, events.next()).await.unwrap().is_none());
    }
}
