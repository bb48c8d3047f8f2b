use crate::connection::{
    AudienceKey, ConnectionId, ConnectionInfo, ConnectionRegistry, FanOut, Subscription,
};
use crate::message::{Event, Message, MessageScope};
use log::*;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Snapshot of the registration table and lifetime delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub students: usize,
    pub unfiltered: usize,
    pub delivered: u64,
    pub dropped: u64,
}

enum Command {
    Register {
        connection_id: ConnectionId,
        info: ConnectionInfo,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    Send(Message),
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Handle to the live-update hub.
///
/// Every operation is a message into one control loop that owns the
/// registration table, so registrations, removals and fan-out are applied in
/// the order they were submitted. Submitting never waits on a subscriber.
/// The loop stops once every clone of the handle is gone.
#[derive(Clone)]
pub struct Manager {
    commands: mpsc::UnboundedSender<Command>,
    queue_capacity: usize,
}

impl Manager {
    /// Start the control loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// If `queue_capacity` is zero.
    pub fn spawn(queue_capacity: usize) -> Self {
        assert!(queue_capacity > 0, "subscriber queue capacity must be at least 1");

        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(receiver));
        info!("Live-update hub started (queue capacity {queue_capacity})");

        Self {
            commands,
            queue_capacity,
        }
    }

    /// Register a new connection and return the queue its writer pump drains.
    pub fn register_connection(&self, audience: AudienceKey) -> Subscription {
        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        self.submit(Command::Register {
            connection_id: connection_id.clone(),
            info: ConnectionInfo { audience, sender },
        });

        Subscription {
            connection_id,
            audience,
            receiver,
        }
    }

    /// Unregister a connection by ID. Safe to call any number of times.
    pub fn unregister_connection(&self, connection_id: &ConnectionId) {
        self.submit(Command::Unregister {
            connection_id: connection_id.clone(),
        });
    }

    /// Send a message based on its scope
    pub fn send_message(&self, message: Message) {
        self.submit(Command::Send(message));
    }

    /// Deliver `event` to every registered connection.
    pub fn broadcast(&self, event: Event) {
        self.send_message(Message {
            event,
            scope: MessageScope::Broadcast,
        });
    }

    /// Deliver `event` only to connections registered under one of `audience`.
    pub fn broadcast_to(&self, audience: Vec<AudienceKey>, event: Event) {
        if audience.is_empty() {
            trace!("Skipping {event}: empty audience");
            return;
        }
        self.send_message(Message {
            event,
            scope: MessageScope::Audience(audience),
        });
    }

    /// Convenience for the common case of addressing students by id.
    pub fn broadcast_to_students(&self, student_ids: &[events::StudentId], event: Event) {
        self.broadcast_to(
            student_ids.iter().copied().map(AudienceKey::Student).collect(),
            event,
        );
    }

    /// Current table size and counters. Answered after every command
    /// submitted before it has been applied.
    pub async fn stats(&self) -> HubStats {
        let (reply, response) = oneshot::channel();
        self.submit(Command::Stats { reply });
        response.await.unwrap_or_default()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            error!("Live-update hub is no longer running; command discarded");
        }
    }
}

/// The control loop. Sole owner of the registration table.
async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry = ConnectionRegistry::new();
    let mut delivered: u64 = 0;
    let mut dropped: u64 = 0;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register {
                connection_id,
                info,
            } => {
                let audience = info.audience;
                registry.register(connection_id.clone(), info);
                info!("Registered live connection {connection_id} ({audience})");
            }
            Command::Unregister { connection_id } => {
                if let Some(audience) = registry.unregister(&connection_id) {
                    info!("Unregistered live connection {connection_id} ({audience})");
                } else {
                    trace!("Connection {connection_id} was already unregistered");
                }
            }
            Command::Send(Message { event, scope }) => {
                let fan_out: FanOut = match &scope {
                    MessageScope::Broadcast => registry.broadcast(&event),
                    MessageScope::Audience(keys) => registry.send_to(keys, &event),
                };
                delivered += fan_out.delivered as u64;
                dropped += fan_out.dropped as u64;
                debug!(
                    "Fan-out of {} ({:?}): {} delivered, {} dropped",
                    event, scope, fan_out.delivered, fan_out.dropped
                );
            }
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    connections: registry.connection_count(),
                    students: registry.student_count(),
                    unfiltered: registry.unfiltered_count(),
                    delivered,
                    dropped,
                });
            }
        }
    }

    info!(
        "Live-update hub stopped; releasing {} connection(s)",
        registry.connection_count()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{kind, Resource};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    async fn next(subscription: &mut Subscription) -> Event {
        timeout(WAIT, subscription.receiver.recv())
            .await
            .expect("timed out waiting for event")
            .expect("queue closed")
    }

    fn assert_empty(subscription: &mut Subscription) {
        assert!(
            subscription.receiver.try_recv().is_err(),
            "connection {} received an unexpected event",
            subscription.connection_id
        );
    }

    #[tokio::test]
    async fn targeted_invalidation_reaches_only_that_student() {
        let manager = Manager::spawn(8);
        let mut student = manager.register_connection(AudienceKey::Student(42));

        manager.broadcast_to_students(&[42], Event::invalidate(Resource::Selections));
        manager.stats().await;

        let event = next(&mut student).await;
        assert_eq!(event.kind(), kind::INVALIDATE_SELECTIONS);
        assert_eq!(event.payload(), "");
        assert_empty(&mut student);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_student() {
        let manager = Manager::spawn(8);
        let mut subscriptions: Vec<_> = (1..=3)
            .map(|id| manager.register_connection(AudienceKey::Student(id)))
            .collect();

        manager.broadcast(Event::notify("maintenance soon"));
        let stats = manager.stats().await;
        assert_eq!(stats.delivered, 3);

        for subscription in subscriptions.iter_mut() {
            let event = next(subscription).await;
            assert_eq!(event.kind(), "notify");
            assert_eq!(event.payload(), "maintenance soon");
            assert_empty(subscription);
        }

        // Key 4 never registered, so a later registration sees nothing old.
        let mut late = manager.register_connection(AudienceKey::Student(4));
        manager.stats().await;
        assert_empty(&mut late);
    }

    #[tokio::test]
    async fn full_queue_keeps_oldest_events_and_never_blocks() {
        let manager = Manager::spawn(2);
        let mut slow = manager.register_connection(AudienceKey::Student(7));

        for count in 0..5 {
            manager.broadcast_to_students(&[7], Event::course_count_update("ART", count));
        }
        let stats = timeout(WAIT, manager.stats()).await.expect("hub blocked");
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 3);

        assert_eq!(next(&mut slow).await.payload(), "ART,0");
        assert_eq!(next(&mut slow).await.payload(), "ART,1");
        assert_empty(&mut slow);
    }

    #[tokio::test]
    async fn disconnected_student_receives_nothing() {
        let manager = Manager::spawn(4);
        let subscription = manager.register_connection(AudienceKey::Student(11));
        let connection_id = subscription.connection_id.clone();
        drop(subscription);
        manager.unregister_connection(&connection_id);

        manager.broadcast_to_students(&[11], Event::invalidate(Resource::Selections));
        let stats = manager.stats().await;

        assert_eq!(stats.connections, 0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn stalled_subscriber_does_not_delay_the_others() {
        let manager = Manager::spawn(1);
        let _stalled = manager.register_connection(AudienceKey::Student(1));
        let mut others: Vec<_> = (2..=5)
            .map(|id| manager.register_connection(AudienceKey::Student(id)))
            .collect();

        for round in 0..10 {
            manager.broadcast(Event::notify(format!("round {round}")));
            for other in others.iter_mut() {
                assert_eq!(next(other).await.payload(), format!("round {round}"));
            }
            manager.broadcast_to_students(&[1, 2, 3, 4, 5], Event::signal("tick"));
            for other in others.iter_mut() {
                assert_eq!(next(other).await.kind(), "tick");
            }
        }

        let stats = timeout(WAIT, manager.stats()).await.expect("hub blocked");
        assert_eq!(stats.dropped, 19);
    }

    #[tokio::test]
    async fn targeted_send_skips_other_keys_and_unfiltered() {
        let manager = Manager::spawn(4);
        let mut s1 = manager.register_connection(AudienceKey::Student(1));
        let mut s2 = manager.register_connection(AudienceKey::Student(2));
        let mut s3 = manager.register_connection(AudienceKey::Student(3));
        let mut s3_second_tab = manager.register_connection(AudienceKey::Student(3));
        let mut admin = manager.register_connection(AudienceKey::Unfiltered);

        manager.broadcast_to_students(&[1, 3], Event::invalidate(Resource::Selections));
        manager.stats().await;

        assert_eq!(next(&mut s1).await.kind(), "invalidate_selections");
        assert_eq!(next(&mut s3).await.kind(), "invalidate_selections");
        assert_eq!(next(&mut s3_second_tab).await.kind(), "invalidate_selections");
        assert_empty(&mut s2);
        assert_empty(&mut admin);

        manager.broadcast_to(
            vec![AudienceKey::Student(2), AudienceKey::Unfiltered],
            Event::invalidate(Resource::Courses),
        );
        manager.stats().await;

        assert_eq!(next(&mut s2).await.kind(), "invalidate_courses");
        assert_eq!(next(&mut admin).await.kind(), "invalidate_courses");
        assert_empty(&mut s1);
        assert_empty(&mut s3);
    }

    #[tokio::test]
    async fn unregister_twice_or_unknown_is_harmless() {
        let manager = Manager::spawn(4);
        let mut kept = manager.register_connection(AudienceKey::Student(1));
        let gone = manager.register_connection(AudienceKey::Student(2));

        manager.unregister_connection(&gone.connection_id);
        manager.unregister_connection(&gone.connection_id);
        manager.unregister_connection(&ConnectionId::new());

        manager.broadcast(Event::invalidate(Resource::Periods));
        let stats = manager.stats().await;

        assert_eq!(stats.connections, 1);
        assert_eq!(next(&mut kept).await.kind(), "invalidate_periods");
    }

    #[tokio::test]
    async fn unregister_closes_the_subscription_queue() {
        let manager = Manager::spawn(4);
        let mut subscription = manager.register_connection(AudienceKey::Unfiltered);

        manager.unregister_connection(&subscription.connection_id);

        let closed = timeout(WAIT, subscription.receiver.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order_across_broadcast_kinds() {
        let manager = Manager::spawn(16);
        let mut student = manager.register_connection(AudienceKey::Student(8));

        manager.broadcast(Event::signal("e1"));
        manager.broadcast_to_students(&[8], Event::signal("e2"));
        manager.broadcast(Event::signal("e3"));
        manager.broadcast_to(vec![AudienceKey::Student(8)], Event::signal("e4"));

        for expected in ["e1", "e2", "e3", "e4"] {
            assert_eq!(next(&mut student).await.kind(), expected);
        }
    }

    #[tokio::test]
    async fn empty_audience_is_not_submitted() {
        let manager = Manager::spawn(4);
        let mut admin = manager.register_connection(AudienceKey::Unfiltered);

        manager.broadcast_to(Vec::new(), Event::hello());
        manager.broadcast_to_students(&[], Event::hello());
        let stats = manager.stats().await;

        assert_eq!(stats.delivered, 0);
        assert_empty(&mut admin);
    }

    #[tokio::test]
    async fn dropping_every_handle_closes_all_queues() {
        let manager = Manager::spawn(4);
        let mut subscription = manager.register_connection(AudienceKey::Student(1));
        manager.stats().await;
        drop(manager);

        let closed = timeout(WAIT, subscription.receiver.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    #[should_panic(expected = "at least 1")]
    async fn zero_capacity_is_rejected() {
        let _ = Manager::spawn(0);
    }
}
