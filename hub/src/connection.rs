use crate::message::Event;
use events::StudentId;
use log::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a connection listens on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudienceKey {
    /// Admin-facing streams; reached by every broadcast and by targeted sends that name it.
    Unfiltered,
    /// A signed-in student's own views.
    Student(StudentId),
}

impl fmt::Display for AudienceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AudienceKey::Unfiltered => f.write_str("unfiltered"),
            AudienceKey::Student(id) => write!(f, "student:{id}"),
        }
    }
}

/// Connection-side half of a registration: the queue the writer pump drains.
///
/// The hub holds the only sender. Once the hub unregisters the connection the
/// receiver yields `None`, which is how the writer pump learns to stop.
#[derive(Debug)]
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub audience: AudienceKey,
    pub receiver: mpsc::Receiver<Event>,
}

/// Hub-side half of a registration.
#[derive(Debug)]
pub(crate) struct ConnectionInfo {
    pub audience: AudienceKey,
    pub sender: mpsc::Sender<Event>,
}

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registration table with dual indices for O(1) lookups.
///
/// Owned by the hub's control loop, so it needs no interior locking.
#[derive(Debug, Default)]
pub(crate) struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: HashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by audience for message routing - O(1)
    audience_index: HashMap<AudienceKey, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its audience key. A connection id that is
    /// already present is moved to the new key so it never sits in two buckets.
    pub fn register(&mut self, connection_id: ConnectionId, info: ConnectionInfo) {
        self.unregister(&connection_id);

        self.audience_index
            .entry(info.audience)
            .or_default()
            .insert(connection_id.clone());
        self.connections.insert(connection_id, info);
    }

    /// Remove a connection, dropping its queue sender. Unknown ids are ignored.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<AudienceKey> {
        let (_, info) = self.connections.remove_entry(connection_id)?;

        if let Some(entry) = self.audience_index.get_mut(&info.audience) {
            entry.remove(connection_id);

            // Clean up empty audience entries
            if entry.is_empty() {
                self.audience_index.remove(&info.audience);
            }
        }

        Some(info.audience)
    }

    /// Deliver to every connection registered under any of `keys`.
    /// Repeated keys are only served once.
    pub fn send_to(&self, keys: &[AudienceKey], event: &Event) -> FanOut {
        let mut fan_out = FanOut::default();
        let mut seen = HashSet::with_capacity(keys.len());

        for key in keys {
            if !seen.insert(*key) {
                continue;
            }
            if let Some(connection_ids) = self.audience_index.get(key) {
                for connection_id in connection_ids {
                    self.deliver(connection_id, event, &mut fan_out);
                }
            }
        }

        fan_out
    }

    /// Deliver to every registered connection.
    pub fn broadcast(&self, event: &Event) -> FanOut {
        let mut fan_out = FanOut::default();
        for connection_id in self.connections.keys() {
            self.deliver(connection_id, event, &mut fan_out);
        }
        fan_out
    }

    /// Non-blocking enqueue. A full queue loses this event and only this event.
    fn deliver(&self, connection_id: &ConnectionId, event: &Event, fan_out: &mut FanOut) {
        let Some(info) = self.connections.get(connection_id) else {
            return;
        };

        match info.sender.try_send(event.clone()) {
            Ok(()) => fan_out.delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Dropping event {} for slow connection {} ({})",
                    event, connection_id, info.audience
                );
                fan_out.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    "Connection {} already stopped reading; awaiting unregistration",
                    connection_id
                );
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn student_count(&self) -> usize {
        self.audience_index
            .keys()
            .filter(|key| matches!(key, AudienceKey::Student(_)))
            .count()
    }

    pub fn unfiltered_count(&self) -> usize {
        self.audience_index
            .get(&AudienceKey::Unfiltered)
            .map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        registry: &mut ConnectionRegistry,
        audience: AudienceKey,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let connection_id = ConnectionId::new();
        registry.register(connection_id.clone(), ConnectionInfo { audience, sender });
        (connection_id, receiver)
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn unregister_is_idempotent_and_cleans_the_index() {
        let mut registry = ConnectionRegistry::new();
        let (id, _rx) = connect(&mut registry, AudienceKey::Student(5), 4);
        assert_eq!(registry.student_count(), 1);

        assert_eq!(registry.unregister(&id), Some(AudienceKey::Student(5)));
        assert_eq!(registry.unregister(&id), None);
        assert_eq!(registry.unregister(&ConnectionId::new()), None);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.student_count(), 0);
    }

    #[test]
    fn unregister_closes_the_outbound_queue() {
        let mut registry = ConnectionRegistry::new();
        let (id, mut rx) = connect(&mut registry, AudienceKey::Unfiltered, 4);
        registry.unregister(&id);
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn re_registering_moves_the_connection_between_buckets() {
        let mut registry = ConnectionRegistry::new();
        let (sender, mut rx) = mpsc::channel(4);
        let id = ConnectionId::new();
        registry.register(
            id.clone(),
            ConnectionInfo {
                audience: AudienceKey::Student(1),
                sender: sender.clone(),
            },
        );
        registry.register(
            id,
            ConnectionInfo {
                audience: AudienceKey::Student(2),
                sender,
            },
        );

        let event = Event::hello();
        assert_eq!(registry.send_to(&[AudienceKey::Student(1)], &event).delivered, 0);
        assert_eq!(registry.send_to(&[AudienceKey::Student(2)], &event).delivered, 1);
        assert_eq!(rx.try_recv().unwrap(), event);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn send_to_serves_repeated_keys_once() {
        let mut registry = ConnectionRegistry::new();
        let (_id, mut rx) = connect(&mut registry, AudienceKey::Student(3), 4);

        let keys = [AudienceKey::Student(3), AudienceKey::Student(3)];
        let fan_out = registry.send_to(&keys, &Event::hello());

        assert_eq!(fan_out.delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_touching_other_connections() {
        let mut registry = ConnectionRegistry::new();
        let (_slow, _slow_rx) = connect(&mut registry, AudienceKey::Student(1), 1);
        let (_fast, mut fast_rx) = connect(&mut registry, AudienceKey::Student(2), 8);

        let first = registry.broadcast(&Event::notify("one"));
        let second = registry.broadcast(&Event::notify("two"));

        assert_eq!(first, FanOut { delivered: 2, dropped: 0 });
        assert_eq!(second, FanOut { delivered: 1, dropped: 1 });
        assert_eq!(fast_rx.try_recv().unwrap().payload(), "one");
        assert_eq!(fast_rx.try_recv().unwrap().payload(), "two");
    }

    #[test]
    fn closed_receiver_is_neither_delivered_nor_dropped() {
        let mut registry = ConnectionRegistry::new();
        let (_id, rx) = connect(&mut registry, AudienceKey::Unfiltered, 1);
        drop(rx);

        assert_eq!(registry.broadcast(&Event::hello()), FanOut::default());
    }

    #[test]
    fn counts_split_students_from_unfiltered() {
        let mut registry = ConnectionRegistry::new();
        let _a = connect(&mut registry, AudienceKey::Student(1), 1);
        let _b = connect(&mut registry, AudienceKey::Student(1), 1);
        let _c = connect(&mut registry, AudienceKey::Student(9), 1);
        let _d = connect(&mut registry, AudienceKey::Unfiltered, 1);

        assert_eq!(registry.connection_count(), 4);
        assert_eq!(registry.student_count(), 2);
        assert_eq!(registry.unfiltered_count(), 1);
    }
}
