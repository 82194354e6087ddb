//! Floor data model: participants, tokens, state snapshots and outcomes.

use super::phase::FloorPhase;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Whether a participant is a person or an AI-driven character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    #[default]
    Human,
    Ai,
}

/// A participant registered with a room's coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: String,
    pub role: ParticipantRole,
    /// Priority used when a floor request does not specify one.
    pub priority_weight: u8,
}

impl Participant {
    #[must_use]
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            role: ParticipantRole::Human,
            priority_weight: crate::config::DEFAULT_PRIORITY,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: ParticipantRole) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_priority_weight(mut self, weight: u8) -> Self {
        self.priority_weight = weight;
        self
    }
}

/// Capability granting the floor of one room to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorToken {
    pub token_id: Uuid,
    pub room_id: String,
    pub participant_id: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Maximum speaking time for this grant, in milliseconds.
    pub max_duration_ms: u64,
}

impl FloorToken {
    pub(crate) fn issue(
        room_id: &str,
        participant_id: &str,
        granted_at: DateTime<Utc>,
        max_duration: Duration,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            participant_id: participant_id.to_string(),
            granted_at,
            expires_at: add_duration(granted_at, max_duration),
            max_duration_ms: u64::try_from(max_duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Maximum speaking time for this grant.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    /// Re-base the expiry when the holder starts speaking.
    pub(crate) fn rebase_expiry(&mut self, from: DateTime<Utc>) {
        self.expires_at = add_duration(from, self.max_duration());
    }
}

pub(crate) fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A participant waiting in the floor queue, as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedParticipant {
    pub participant_id: String,
    pub priority: u8,
    pub queued_at: DateTime<Utc>,
}

/// Snapshot of one room's floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorState {
    pub room_id: String,
    #[serde(rename = "state")]
    pub phase: FloorPhase,
    pub current_holder: Option<String>,
    /// Queue in grant order (position 1 first).
    pub queue: Vec<QueuedParticipant>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
}

impl FloorState {
    #[must_use]
    pub fn idle(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            phase: FloorPhase::Idle,
            current_holder: None,
            queue: Vec::new(),
            token_expires_at: None,
            last_state_change: Utc::now(),
        }
    }

    /// Nobody holds, waits for or is cooling down from the floor.
    #[must_use]
    pub fn is_vacant(&self) -> bool {
        self.phase == FloorPhase::Idle && self.current_holder.is_none() && self.queue.is_empty()
    }

    /// 1-based queue position of a participant.
    #[must_use]
    pub fn queue_position(&self, participant_id: &str) -> Option<usize> {
        self.queue
            .iter()
            .position(|q| q.participant_id == participant_id)
            .map(|i| i + 1)
    }
}

/// Parameters of a floor request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloorRequest {
    /// Requested priority; `None` uses the participant's weight.
    pub priority: Option<u8>,
    /// Requested speaking time; capped at the room's max duration.
    pub duration: Option<Duration>,
}

impl FloorRequest {
    #[must_use]
    pub fn with_priority(priority: u8) -> Self {
        Self {
            priority: Some(priority),
            duration: None,
        }
    }

    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Why a participant did not (or no longer can) get the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Floor is busy; waiting in queue.
    Queued,
    /// Replaced by a newer request from the same participant.
    Superseded,
    /// Request cancelled by the participant.
    Withdrawn,
    /// Participant disconnected while queued.
    Disconnected,
    /// Room shut down.
    RoomClosed,
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Queued => "queued",
            DenyReason::Superseded => "superseded",
            DenyReason::Withdrawn => "withdrawn",
            DenyReason::Disconnected => "disconnected",
            DenyReason::RoomClosed => "room_closed",
        }
    }
}

/// Why a floor token ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    /// Holder released the floor.
    Voluntary,
    /// Watchdog revoked an unresponsive or over-time holder.
    Timeout,
    /// Holder disconnected.
    Disconnected,
    /// Room shut down.
    RoomClosed,
}

impl ReleaseReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::Voluntary => "voluntary",
            ReleaseReason::Timeout => "timeout",
            ReleaseReason::Disconnected => "disconnected",
            ReleaseReason::RoomClosed => "room_closed",
        }
    }
}

/// Floor granted to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorGrant {
    pub room_id: String,
    pub participant_id: String,
    pub timestamp: DateTime<Utc>,
    pub token: FloorToken,
}

/// Negative (or deferred) outcome for a participant's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorDenial {
    pub room_id: String,
    pub participant_id: String,
    pub timestamp: DateTime<Utc>,
    pub reason: DenyReason,
    /// 1-based position. For terminal reasons, the position the request held
    /// when it left the queue.
    pub queue_position: usize,
}

/// A floor token ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloorRelease {
    pub room_id: String,
    pub participant_id: String,
    pub token_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub reason: ReleaseReason,
}

/// Final outcome of a floor ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorOutcome {
    Granted(FloorToken),
    Denied {
        reason: DenyReason,
        queue_position: usize,
    },
}

impl FloorOutcome {
    #[must_use]
    pub fn token(&self) -> Option<&FloorToken> {
        match self {
            FloorOutcome::Granted(token) => Some(token),
            FloorOutcome::Denied { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry() {
        let granted_at = Utc::now();
        let token = FloorToken::issue("room-1", "alice", granted_at, Duration::from_secs(30));

        assert_eq!(token.max_duration(), Duration::from_secs(30));
        assert_eq!(token.max_duration_ms, 30_000);
        assert_eq!(token.expires_at, granted_at + chrono::Duration::seconds(30));
    }

    #[test]
    fn test_token_rebase_keeps_duration() {
        let granted_at = Utc::now();
        let mut token = FloorToken::issue("room-1", "alice", granted_at, Duration::from_secs(5));
        let start = granted_at + chrono::Duration::seconds(2);

        token.rebase_expiry(start);

        assert_eq!(token.expires_at, start + chrono::Duration::seconds(5));
        assert_eq!(token.granted_at, granted_at);
    }

    #[test]
    fn test_tokens_are_unique() {
        let now = Utc::now();
        let a = FloorToken::issue("room-1", "alice", now, Duration::from_secs(1));
        let b = FloorToken::issue("room-1", "alice", now, Duration::from_secs(1));
        assert_ne!(a.token_id, b.token_id);
    }

    #[test]
    fn test_queue_position_is_one_based() {
        let mut state = FloorState::idle("room-1");
        for id in ["a", "b"] {
            state.queue.push(QueuedParticipant {
                participant_id: id.to_string(),
                priority: 1,
                queued_at: Utc::now(),
            });
        }

        assert_eq!(state.queue_position("a"), Some(1));
        assert_eq!(state.queue_position("b"), Some(2));
        assert_eq!(state.queue_position("c"), None);
    }

    #[test]
    fn test_vacancy() {
        let mut state = FloorState::idle("room-1");
        assert!(state.is_vacant());

        state.phase = FloorPhase::Cooldown;
        assert!(!state.is_vacant());

        state.phase = FloorPhase::Idle;
        state.queue.push(QueuedParticipant {
            participant_id: "a".to_string(),
            priority: 1,
            queued_at: Utc::now(),
        });
        assert!(!state.is_vacant());
    }

    #[test]
    fn test_participant_builder() {
        let p = Participant::new("kiri", "Kiri")
            .with_role(ParticipantRole::Ai)
            .with_priority_weight(5);
        assert_eq!(p.role, ParticipantRole::Ai);
        assert_eq!(p.priority_weight, 5);
    }

    #[test]
    fn test_state_serializes_phase_as_state() {
        let json = serde_json::to_value(FloorState::idle("room-1")).unwrap();
        assert_eq!(json["state"], "idle");
        assert!(json["current_holder"].is_null());
    }
}
