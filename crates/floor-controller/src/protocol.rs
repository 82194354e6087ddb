//! Room event channel wire format (JSON text frames).
//!
//! Server events and replies carry a `type` discriminator:
//!
//! ```json
//! {"type":"FLOOR_GRANTED","room_id":"r1","participant_id":"kiri","timestamp":"...","token":{...}}
//! {"type":"FLOOR_DENIED","room_id":"r1","participant_id":"yuki","timestamp":"...","reason":"QUEUED","queue_position":2}
//! {"type":"ERROR","code":"NOT_FLOOR_HOLDER","message":"You do not hold the floor","retryable":false}
//! ```
//!
//! Client commands use the same convention (`{"type":"REQUEST_FLOOR","priority":5}`).

use crate::errors::FcError;
use crate::floor::{FloorDenial, FloorGrant, FloorRelease, FloorRequest, FloorState};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Floor event delivered to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FloorEvent {
    FloorGranted(FloorGrant),
    FloorDenied(FloorDenial),
    FloorStateChanged(FloorState),
    FloorReleased(FloorRelease),
}

impl FloorEvent {
    /// Wire `type` value, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            FloorEvent::FloorGranted(_) => "FLOOR_GRANTED",
            FloorEvent::FloorDenied(_) => "FLOOR_DENIED",
            FloorEvent::FloorStateChanged(_) => "FLOOR_STATE_CHANGED",
            FloorEvent::FloorReleased(_) => "FLOOR_RELEASED",
        }
    }
}

/// Direct reply to a client command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerReply {
    /// Reply to `GET_FLOOR_STATE`.
    FloorState(FloorState),
    Ack,
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl From<&FcError> for ServerReply {
    fn from(err: &FcError) -> Self {
        ServerReply::Error {
            code: err.error_code().to_string(),
            message: err.client_message(),
            retryable: err.retryable(),
        }
    }
}

/// Anything the server writes to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(FloorEvent),
    Reply(ServerReply),
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<FloorEvent> for ServerMessage {
    fn from(event: FloorEvent) -> Self {
        ServerMessage::Event(event)
    }
}

impl From<ServerReply> for ServerMessage {
    fn from(reply: ServerReply) -> Self {
        ServerMessage::Reply(reply)
    }
}

/// Command sent by a client over its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientCommand {
    RequestFloor {
        #[serde(default)]
        priority: Option<u8>,
        #[serde(default)]
        max_duration_ms: Option<u64>,
    },
    ReleaseFloor,
    BeginThinking,
    BeginSpeaking,
    SignalActivity,
    CancelRequest,
    GetFloorState,
}

impl ClientCommand {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self, FcError> {
        serde_json::from_str(text).map_err(|e| FcError::InvalidRequest(e.to_string()))
    }

    /// Floor request parameters carried by `REQUEST_FLOOR`.
    #[must_use]
    pub fn floor_request(&self) -> Option<FloorRequest> {
        match self {
            ClientCommand::RequestFloor {
                priority,
                max_duration_ms,
            } => Some(FloorRequest {
                priority: *priority,
                duration: max_duration_ms.map(Duration::from_millis),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::floor::{DenyReason, FloorToken, ReleaseReason};
    use chrono::Utc;

    #[test]
    fn test_granted_event_shape() {
        let now = Utc::now();
        let token = FloorToken::issue("room-1", "kiri", now, Duration::from_secs(30));
        let event = FloorEvent::FloorGranted(FloorGrant {
            room_id: "room-1".to_string(),
            participant_id: "kiri".to_string(),
            timestamp: now,
            token: token.clone(),
        });

        let json = serde_json::to_value(ServerMessage::from(event)).unwrap();

        assert_eq!(json["type"], "FLOOR_GRANTED");
        assert_eq!(json["participant_id"], "kiri");
        assert_eq!(json["token"]["max_duration_ms"], 30_000);
        assert_eq!(json["token"]["token_id"], token.token_id.to_string());
    }

    #[test]
    fn test_denied_event_shape() {
        let event = FloorEvent::FloorDenied(FloorDenial {
            room_id: "room-1".to_string(),
            participant_id: "yuki".to_string(),
            timestamp: Utc::now(),
            reason: DenyReason::RoomClosed,
            queue_position: 0,
        });

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "FLOOR_DENIED");
        assert_eq!(json["reason"], "ROOM_CLOSED");
        assert_eq!(json["queue_position"], 0);
    }

    #[test]
    fn test_state_changed_event_shape() {
        let json =
            serde_json::to_value(FloorEvent::FloorStateChanged(FloorState::idle("room-1"))).unwrap();

        assert_eq!(json["type"], "FLOOR_STATE_CHANGED");
        assert_eq!(json["state"], "idle");
        assert!(json["queue"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_released_event_shape() {
        let event = FloorEvent::FloorReleased(FloorRelease {
            room_id: "room-1".to_string(),
            participant_id: "kiri".to_string(),
            token_id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            reason: ReleaseReason::Timeout,
        });
        assert_eq!(event.kind(), "FLOOR_RELEASED");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["reason"], "TIMEOUT");
    }

    #[test]
    fn test_error_reply_from_fc_error() {
        let reply = ServerReply::from(&FcError::NotFloorHolder("yuki".to_string()));
        let json = serde_json::to_value(ServerMessage::from(reply)).unwrap();

        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["code"], "NOT_FLOOR_HOLDER");
        assert_eq!(json["retryable"], false);
        assert!(!json["message"].as_str().unwrap().contains("yuki"));
    }

    #[test]
    fn test_ack_reply() {
        let text = ServerMessage::Reply(ServerReply::Ack).to_json().unwrap();
        assert_eq!(text, r#"{"type":"ACK"}"#);
    }

    #[test]
    fn test_server_message_parses_back_as_event() {
        let text = ServerMessage::from(FloorEvent::FloorStateChanged(FloorState::idle("r")))
            .to_json()
            .unwrap();

        let parsed: ServerMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(
            parsed,
            ServerMessage::Event(FloorEvent::FloorStateChanged(_))
        ));
    }

    #[test]
    fn test_parse_request_floor() {
        let cmd = ClientCommand::parse(r#"{"type":"REQUEST_FLOOR","priority":5,"max_duration_ms":8000}"#)
            .unwrap();

        let request = cmd.floor_request().unwrap();
        assert_eq!(request.priority, Some(5));
        assert_eq!(request.duration, Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_parse_request_floor_without_fields() {
        let cmd = ClientCommand::parse(r#"{"type":"REQUEST_FLOOR"}"#).unwrap();
        assert_eq!(cmd.floor_request(), Some(FloorRequest::default()));
    }

    #[test]
    fn test_parse_unit_commands() {
        assert_eq!(
            ClientCommand::parse(r#"{"type":"RELEASE_FLOOR"}"#).unwrap(),
            ClientCommand::ReleaseFloor
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"BEGIN_THINKING"}"#).unwrap(),
            ClientCommand::BeginThinking
        );
        assert_eq!(
            ClientCommand::parse(r#"{"type":"GET_FLOOR_STATE"}"#).unwrap(),
            ClientCommand::GetFloorState
        );
        assert!(ClientCommand::ReleaseFloor.floor_request().is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let err = ClientCommand::parse(r#"{"type":"SEIZE_FLOOR"}"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");

        assert!(ClientCommand::parse("not json").is_err());
    }
}
