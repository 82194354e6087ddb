//! Recording session transport.
//!
//! Captures every event a coordinator delivers, in order, so tests can check
//! who was told what.

use floor_controller::floor::{FloorDenial, FloorGrant, FloorRelease, FloorState};
use floor_controller::protocol::{FloorEvent, ServerMessage};
use floor_controller::transport::{SessionTransport, TransportError};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Direct {
        room_id: String,
        participant_id: String,
        event: FloorEvent,
    },
    Broadcast {
        room_id: String,
        event: FloorEvent,
    },
}

impl Delivery {
    pub fn event(&self) -> &FloorEvent {
        match self {
            Delivery::Direct { event, .. } | Delivery::Broadcast { event, .. } => event,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    deliveries: Vec<Delivery>,
    /// Participants treated as not connected.
    offline: HashSet<String>,
}

/// `SessionTransport` that records deliveries instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make direct sends to `participant_id` fail with `NotConnected`.
    pub fn set_offline(&self, participant_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .offline
            .insert(participant_id.to_string());
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.inner.lock().unwrap().deliveries.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().deliveries.clear();
    }

    /// Events sent directly to one participant, in order.
    pub fn direct_to(&self, participant_id: &str) -> Vec<FloorEvent> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Direct {
                    participant_id: to,
                    event,
                    ..
                } if to == participant_id => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn grants_for(&self, participant_id: &str) -> Vec<FloorGrant> {
        self.direct_to(participant_id)
            .into_iter()
            .filter_map(|e| match e {
                FloorEvent::FloorGranted(grant) => Some(grant),
                _ => None,
            })
            .collect()
    }

    pub fn denials_for(&self, participant_id: &str) -> Vec<FloorDenial> {
        self.direct_to(participant_id)
            .into_iter()
            .filter_map(|e| match e {
                FloorEvent::FloorDenied(denial) => Some(denial),
                _ => None,
            })
            .collect()
    }

    /// Every denial delivered, to anyone.
    pub fn all_denials(&self) -> Vec<FloorDenial> {
        self.deliveries()
            .iter()
            .filter_map(|d| match d.event() {
                FloorEvent::FloorDenied(denial) => Some(denial.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> Vec<FloorRelease> {
        self.deliveries()
            .iter()
            .filter_map(|d| match d.event() {
                FloorEvent::FloorReleased(release) => Some(release.clone()),
                _ => None,
            })
            .collect()
    }

    /// Broadcast state snapshots, in order.
    pub fn states(&self) -> Vec<FloorState> {
        self.deliveries()
            .iter()
            .filter_map(|d| match d {
                Delivery::Broadcast {
                    event: FloorEvent::FloorStateChanged(state),
                    ..
                } => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    /// Wire form of every delivered event.
    pub fn json_frames(&self) -> Vec<serde_json::Value> {
        self.deliveries()
            .iter()
            .map(|d| serde_json::to_value(ServerMessage::from(d.event().clone())).unwrap())
            .collect()
    }
}

impl SessionTransport for RecordingTransport {
    fn send_to_participant(
        &self,
        room_id: &str,
        participant_id: &str,
        event: &FloorEvent,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline.contains(participant_id) {
            return Err(TransportError::NotConnected(participant_id.to_string()));
        }
        inner.deliveries.push(Delivery::Direct {
            room_id: room_id.to_string(),
            participant_id: participant_id.to_string(),
            event: event.clone(),
        });
        Ok(())
    }

    fn broadcast(&self, room_id: &str, event: &FloorEvent) -> usize {
        self.inner.lock().unwrap().deliveries.push(Delivery::Broadcast {
            room_id: room_id.to_string(),
            event: event.clone(),
        });
        1
    }
}
