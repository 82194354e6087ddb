//! Session transport seam.
//!
//! The coordinator delivers floor events through [`SessionTransport`] and
//! never talks to sockets directly. [`ConnectionRegistry`] is the WebSocket
//! implementation; [`NullTransport`] discards everything (observer-only
//! embedding).

pub mod registry;
pub mod websocket;

pub use registry::ConnectionRegistry;

use crate::protocol::FloorEvent;

use thiserror::Error;

/// Delivery failures. Never fatal to the room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Participant not connected: {0}")]
    NotConnected(String),

    #[error("Outbound queue full for participant: {0}")]
    Backpressure(String),

    #[error("Connection closed for participant: {0}")]
    Closed(String),
}

/// Outbound delivery for one or many rooms.
///
/// Implementations must not block: the coordinator calls these from its
/// actor loop.
pub trait SessionTransport: Send + Sync {
    /// Deliver an event to one participant of a room.
    fn send_to_participant(
        &self,
        room_id: &str,
        participant_id: &str,
        event: &FloorEvent,
    ) -> Result<(), TransportError>;

    /// Deliver an event to every connected participant of a room.
    ///
    /// Returns how many participants it reached.
    fn broadcast(&self, room_id: &str, event: &FloorEvent) -> usize;
}

/// Transport that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl SessionTransport for NullTransport {
    fn send_to_participant(
        &self,
        _room_id: &str,
        _participant_id: &str,
        _event: &FloorEvent,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    fn broadcast(&self, _room_id: &str, _event: &FloorEvent) -> usize {
        0
    }
}
