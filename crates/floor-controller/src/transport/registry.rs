//! Connected sessions, indexed by room and participant.

use super::{SessionTransport, TransportError};
use crate::protocol::{FloorEvent, ServerMessage};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

struct Connection {
    connection_id: u64,
    sender: mpsc::Sender<ServerMessage>,
}

/// Registry of live sessions.
///
/// A participant has at most one live connection per room; registering a new
/// connection replaces the previous one.
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, HashMap<String, Connection>>>,
    next_connection_id: AtomicU64,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's outbound queue. Returns its connection id.
    pub fn register(
        &self,
        room_id: &str,
        participant_id: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> u64 {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let previous = rooms.entry(room_id.to_string()).or_default().insert(
            participant_id.to_string(),
            Connection {
                connection_id,
                sender,
            },
        );

        if previous.is_some() {
            debug!(
                target: "fc.transport.ws",
                room_id = %room_id,
                participant_id = %participant_id,
                connection_id,
                "Replaced existing session"
            );
        }
        connection_id
    }

    /// Remove a session if it is still the participant's current one.
    ///
    /// Returns `false` when a newer connection has replaced it.
    pub fn unregister(&self, room_id: &str, participant_id: &str, connection_id: u64) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(participants) = rooms.get_mut(room_id) else {
            return false;
        };

        let is_current = participants
            .get(participant_id)
            .is_some_and(|c| c.connection_id == connection_id);
        if is_current {
            participants.remove(participant_id);
            if participants.is_empty() {
                rooms.remove(room_id);
            }
        }
        is_current
    }

    #[cfg(test)]
    fn is_connected(&self, room_id: &str, participant_id: &str) -> bool {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .is_some_and(|p| p.contains_key(participant_id))
    }

    #[cfg(test)]
    fn connection_count(&self, room_id: &str) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .map_or(0, HashMap::len)
    }

    fn deliver(
        connection: &Connection,
        participant_id: &str,
        message: ServerMessage,
    ) -> Result<(), TransportError> {
        // try_send so a slow client never stalls the room actor
        connection.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Backpressure(participant_id.to_string()),
            TrySendError::Closed(_) => TransportError::Closed(participant_id.to_string()),
        })
    }
}

impl SessionTransport for ConnectionRegistry {
    fn send_to_participant(
        &self,
        room_id: &str,
        participant_id: &str,
        event: &FloorEvent,
    ) -> Result<(), TransportError> {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        let connection = rooms
            .get(room_id)
            .and_then(|p| p.get(participant_id))
            .ok_or_else(|| TransportError::NotConnected(participant_id.to_string()))?;

        Self::deliver(connection, participant_id, event.clone().into())
    }

    fn broadcast(&self, room_id: &str, event: &FloorEvent) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(PoisonError::into_inner);
        let Some(participants) = rooms.get(room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (participant_id, connection) in participants {
            match Self::deliver(connection, participant_id, event.clone().into()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    target: "fc.transport.ws",
                    room_id = %room_id,
                    participant_id = %participant_id,
                    event = event.kind(),
                    error = %e,
                    "Broadcast delivery failed"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::floor::FloorState;

    fn state_event(room_id: &str) -> FloorEvent {
        FloorEvent::FloorStateChanged(FloorState::idle(room_id))
    }

    #[tokio::test]
    async fn test_send_to_registered_participant() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register("room-1", "kiri", tx);

        registry
            .send_to_participant("room-1", "kiri", &state_event("room-1"))
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Event(FloorEvent::FloorStateChanged(_))
        ));
    }

    #[test]
    fn test_send_to_unknown_participant() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .send_to_participant("room-1", "ghost", &state_event("room-1"))
            .unwrap_err();
        assert_eq!(err, TransportError::NotConnected("ghost".to_string()));
    }

    #[test]
    fn test_backpressure_and_closed() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        registry.register("room-1", "slow", tx);

        registry
            .send_to_participant("room-1", "slow", &state_event("room-1"))
            .unwrap();
        assert_eq!(
            registry.send_to_participant("room-1", "slow", &state_event("room-1")),
            Err(TransportError::Backpressure("slow".to_string()))
        );

        drop(rx);
        assert_eq!(
            registry.send_to_participant("room-1", "slow", &state_event("room-1")),
            Err(TransportError::Closed("slow".to_string()))
        );
    }

    #[test]
    fn test_broadcast_is_room_scoped() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let (tx_other, mut rx_other) = mpsc::channel(4);
        registry.register("room-1", "a", tx_a);
        registry.register("room-1", "b", tx_b);
        registry.register("room-2", "c", tx_other);

        let delivered = registry.broadcast("room-1", &state_event("room-1"));

        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_other.try_recv().is_err());
        assert_eq!(registry.broadcast("room-9", &state_event("room-9")), 0);
    }

    #[test]
    fn test_stale_unregister_keeps_new_connection() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = mpsc::channel(1);
        let (new_tx, _new_rx) = mpsc::channel(1);

        let old_id = registry.register("room-1", "kiri", old_tx);
        let new_id = registry.register("room-1", "kiri", new_tx);

        assert!(!registry.unregister("room-1", "kiri", old_id));
        assert!(registry.is_connected("room-1", "kiri"));

        assert!(registry.unregister("room-1", "kiri", new_id));
        assert!(!registry.is_connected("room-1", "kiri"));
        assert_eq!(registry.connection_count("room-1"), 0);
    }
}
