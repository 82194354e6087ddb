//! WebSocket session layer.
//!
//! One session per participant per room:
//!
//! 1. `GET /rooms/:room_id/ws?participant_id=..` upgrades and registers the
//!    participant with the room's coordinator.
//! 2. A writer task drains the session's outbound queue into the socket. The
//!    same queue is registered in the [`ConnectionRegistry`], so floor events
//!    and command replies share one ordered stream.
//! 3. Each text frame is parsed as a [`ClientCommand`] and answered with
//!    `ACK`, `FLOOR_STATE` or `ERROR`.
//! 4. When the socket closes, the session unregisters and reports the
//!    disconnect to the coordinator (unless a newer session replaced it).
//! 5. Finally the session is closed on the controller, which reclaims the
//!    room once no sessions remain and the floor is vacant.

use super::ConnectionRegistry;
use crate::actors::{FloorControllerActorHandle, FloorCoordinatorHandle};
use crate::errors::FcError;
use crate::floor::{Participant, ParticipantRole};
use crate::protocol::{ClientCommand, ServerMessage, ServerReply};
use crate::routes::AppState;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outbound queue capacity per session. A full queue drops events for that
/// session only.
pub const OUTBOUND_BUFFER: usize = 256;

/// Client frames are small JSON commands.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Query parameters for a session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionQuery {
    pub participant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: ParticipantRole,
    /// Default priority for this participant's requests.
    #[serde(default)]
    pub priority: Option<u8>,
}

impl SessionQuery {
    /// Build the participant to register, rejecting an empty id.
    pub fn into_participant(self, default_priority: u8) -> Result<Participant, FcError> {
        let participant_id = self.participant_id.trim().to_string();
        if participant_id.is_empty() {
            return Err(FcError::InvalidRequest(
                "participant_id must not be empty".to_string(),
            ));
        }
        let display_name = self
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| participant_id.clone());

        Ok(Participant::new(participant_id, display_name)
            .with_role(self.role)
            .with_priority_weight(self.priority.unwrap_or(default_priority)))
    }
}

/// Upgrade handler for `GET /rooms/:room_id/ws`.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<SessionQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, FcError> {
    let participant = query.into_participant(state.default_priority)?;
    let room = state.controller.open_session(room_id).await?;
    if let Err(e) = room.register_participant(participant.clone()).await {
        close_session(&state.controller, room.room_id()).await;
        return Err(e);
    }

    let registry = Arc::clone(&state.registry);
    let controller = state.controller.clone();

    let failed_room = room.clone();
    let failed_controller = controller.clone();
    let failed_participant_id = participant.participant_id.clone();

    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_failed_upgrade(move |e| {
            warn!(
                target: "fc.transport.ws",
                room_id = %failed_room.room_id(),
                participant_id = %failed_participant_id,
                error = %e,
                "WebSocket upgrade failed"
            );
            tokio::spawn(async move {
                let _ = failed_room
                    .participant_disconnected(failed_participant_id)
                    .await;
                close_session(&failed_controller, failed_room.room_id()).await;
            });
        })
        .on_upgrade(move |socket| run_session(socket, registry, controller, room, participant)))
}

async fn close_session(controller: &FloorControllerActorHandle, room_id: &str) {
    if let Err(e) = controller.close_session(room_id).await {
        debug!(
            target: "fc.transport.ws",
            room_id = %room_id,
            error = %e,
            "Controller gone before session close was reported"
        );
    }
}

async fn run_session(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    controller: FloorControllerActorHandle,
    room: FloorCoordinatorHandle,
    participant: Participant,
) {
    let room_id = room.room_id().to_string();
    let participant_id = participant.participant_id;

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let connection_id = registry.register(&room_id, &participant_id, tx.clone());

    info!(
        target: "fc.transport.ws",
        room_id = %room_id,
        participant_id = %participant_id,
        connection_id,
        "Session connected"
    );

    let (mut sink, mut stream) = socket.split();

    let writer_room_id = room_id.clone();
    let writer_participant_id = participant_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        target: "fc.transport.ws",
                        room_id = %writer_room_id,
                        participant_id = %writer_participant_id,
                        error = %e,
                        "Failed to encode server message"
                    );
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!(
                    target: "fc.transport.ws",
                    room_id = %writer_room_id,
                    participant_id = %writer_participant_id,
                    error = %e,
                    "Socket write failed, stopping writer"
                );
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Start every session from a full snapshot.
    reply(&tx, ServerReply::FloorState(room.floor_state()));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let response = handle_command(&room, &participant_id, &text).await;
                reply(&tx, response);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {
                // Binary frames are not part of the protocol; ping/pong is
                // answered by axum.
            }
            Err(e) => {
                debug!(
                    target: "fc.transport.ws",
                    room_id = %room_id,
                    participant_id = %participant_id,
                    error = %e,
                    "Socket read failed"
                );
                break;
            }
        }
    }

    if registry.unregister(&room_id, &participant_id, connection_id) {
        if let Err(e) = room.participant_disconnected(participant_id.as_str()).await {
            debug!(
                target: "fc.transport.ws",
                room_id = %room_id,
                participant_id = %participant_id,
                error = %e,
                "Room gone before disconnect was reported"
            );
        }
    }

    drop(tx);
    let _ = writer.await;

    // The disconnect must land before the controller checks for vacancy.
    let _ = room.get_state().await;
    close_session(&controller, &room_id).await;

    info!(
        target: "fc.transport.ws",
        room_id = %room_id,
        participant_id = %participant_id,
        connection_id,
        "Session closed"
    );
}

fn reply(tx: &mpsc::Sender<ServerMessage>, message: ServerReply) {
    if let Err(e) = tx.try_send(message.into()) {
        warn!(
            target: "fc.transport.ws",
            error = %e,
            "Dropped reply for slow session"
        );
    }
}

/// Run one client command against the room and build the reply.
///
/// Grants and denials arrive separately as floor events; `REQUEST_FLOOR`
/// itself is answered with `ACK`.
pub async fn handle_command(
    room: &FloorCoordinatorHandle,
    participant_id: &str,
    text: &str,
) -> ServerReply {
    let command = match ClientCommand::parse(text) {
        Ok(command) => command,
        Err(e) => return ServerReply::from(&e),
    };

    let result = match &command {
        ClientCommand::RequestFloor { .. } => {
            let request = command.floor_request().unwrap_or_default();
            room.request_floor(participant_id, request).await.map(drop)
        }
        ClientCommand::ReleaseFloor => room.release_floor(participant_id).await,
        ClientCommand::BeginThinking => room.begin_thinking(participant_id).await,
        ClientCommand::BeginSpeaking => room.begin_speaking(participant_id).await,
        ClientCommand::SignalActivity => room.signal_activity(participant_id).await,
        ClientCommand::CancelRequest => room.cancel_request(participant_id).await,
        ClientCommand::GetFloorState => {
            return match room.get_state().await {
                Ok(state) => ServerReply::FloorState(state),
                Err(e) => ServerReply::from(&e),
            };
        }
    };

    match result {
        Ok(()) => ServerReply::Ack,
        Err(e) => {
            debug!(
                target: "fc.transport.ws",
                room_id = %room.room_id(),
                participant_id = %participant_id,
                code = e.error_code(),
                error = %e,
                "Command rejected"
            );
            ServerReply::from(&e)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, FloorCoordinator};
    use crate::config::FloorConfig;
    use crate::floor::FloorPhase;
    use crate::transport::NullTransport;
    use tokio_util::sync::CancellationToken;

    fn room() -> FloorCoordinatorHandle {
        FloorCoordinator::spawn(
            "room-1".to_string(),
            FloorConfig::default(),
            Arc::new(NullTransport),
            CancellationToken::new(),
            ActorMetrics::new(),
        )
        .0
    }

    fn error_code(reply: &ServerReply) -> &str {
        match reply {
            ServerReply::Error { code, .. } => code,
            other => panic!("expected error reply, got {other:?}"),
        }
    }

    #[test]
    fn test_query_into_participant() {
        let query = SessionQuery {
            participant_id: " kiri ".to_string(),
            display_name: None,
            role: ParticipantRole::Ai,
            priority: Some(6),
        };

        let participant = query.into_participant(1).unwrap();

        assert_eq!(participant.participant_id, "kiri");
        assert_eq!(participant.display_name, "kiri");
        assert_eq!(participant.role, ParticipantRole::Ai);
        assert_eq!(participant.priority_weight, 6);
    }

    #[test]
    fn test_query_rejects_blank_participant() {
        let query = SessionQuery {
            participant_id: "  ".to_string(),
            display_name: Some("Nobody".to_string()),
            role: ParticipantRole::Human,
            priority: None,
        };

        assert!(matches!(
            query.into_participant(1),
            Err(FcError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_command_flow() {
        let room = room();

        let reply = handle_command(&room, "kiri", r#"{"type":"REQUEST_FLOOR","priority":3}"#).await;
        assert_eq!(reply, ServerReply::Ack);

        let reply = handle_command(&room, "kiri", r#"{"type":"BEGIN_SPEAKING"}"#).await;
        assert_eq!(reply, ServerReply::Ack);

        match handle_command(&room, "kiri", r#"{"type":"GET_FLOOR_STATE"}"#).await {
            ServerReply::FloorState(state) => {
                assert_eq!(state.phase, FloorPhase::Speaking);
                assert_eq!(state.current_holder.as_deref(), Some("kiri"));
            }
            other => panic!("expected state, got {other:?}"),
        }

        let reply = handle_command(&room, "kiri", r#"{"type":"RELEASE_FLOOR"}"#).await;
        assert_eq!(reply, ServerReply::Ack);

        room.cancel();
    }

    #[tokio::test]
    async fn test_command_errors_map_to_codes() {
        let room = room();

        let reply = handle_command(&room, "yuki", r#"{"type":"RELEASE_FLOOR"}"#).await;
        assert_eq!(error_code(&reply), "NOT_FLOOR_HOLDER");

        let reply = handle_command(&room, "yuki", r#"{"type":"CANCEL_REQUEST"}"#).await;
        assert_eq!(error_code(&reply), "FLOOR_DENIED");

        let reply = handle_command(&room, "yuki", "{not json").await;
        assert_eq!(error_code(&reply), "INVALID_REQUEST");

        let reply =
            handle_command(&room, "yuki", r#"{"type":"REQUEST_FLOOR","priority":99}"#).await;
        assert_eq!(error_code(&reply), "INVALID_REQUEST");

        room.cancel();
    }
}
