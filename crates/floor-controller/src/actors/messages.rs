//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Replies use `tokio::sync::oneshot`.

use super::coordinator::FloorCoordinatorHandle;
use crate::config::FloorConfig;
use crate::errors::FcError;
use crate::floor::{FloorOutcome, FloorRequest, FloorState, Participant};

use std::time::Duration;
use tokio::sync::oneshot;

/// Messages sent to `FloorControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Create a coordinator for a new room.
    CreateRoom {
        room_id: String,
        /// Overrides the controller's default floor config.
        floor: Option<FloorConfig>,
        respond_to: oneshot::Sender<Result<FloorCoordinatorHandle, FcError>>,
    },

    GetRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<FloorCoordinatorHandle, FcError>>,
    },

    /// Open a session on a room, creating it with the default config if
    /// absent.
    OpenSession {
        room_id: String,
        respond_to: oneshot::Sender<Result<FloorCoordinatorHandle, FcError>>,
    },

    /// A session opened with `OpenSession` ended.
    CloseSession { room_id: String },

    /// Close a room; outstanding tickets resolve with `ROOM_CLOSED`.
    RemoveRoom {
        room_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Initiate graceful shutdown (SIGTERM received).
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
}

/// Controller status snapshot.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    pub instance_id: String,
    pub room_count: usize,
    pub is_draining: bool,
    pub total_grants: u64,
}

/// Reply to a floor request, used to build a `FloorTicket`.
#[derive(Debug)]
pub struct RequestAccepted {
    /// `None` when the floor was granted immediately.
    pub queue_position: Option<usize>,
    pub outcome: oneshot::Receiver<FloorOutcome>,
}

/// Messages sent to `FloorCoordinator`.
#[derive(Debug)]
pub enum FloorMessage {
    /// Add or update a participant's role and priority weight.
    RegisterParticipant {
        participant: Participant,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    RequestFloor {
        participant_id: String,
        request: FloorRequest,
        respond_to: oneshot::Sender<Result<RequestAccepted, FcError>>,
    },

    ReleaseFloor {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    BeginThinking {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    BeginSpeaking {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    /// Holder liveness signal (audio frames, typing indicator).
    SignalActivity {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    /// Withdraw a queued request.
    CancelRequest {
        participant_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },

    /// The session layer lost the participant's connection.
    ParticipantDisconnected { participant_id: String },

    GetState {
        respond_to: oneshot::Sender<FloorState>,
    },
}

impl FloorMessage {
    /// Answer the message with `err` without handling it.
    pub(crate) fn reject(self, err: impl Fn() -> FcError) {
        match self {
            FloorMessage::RegisterParticipant { respond_to, .. }
            | FloorMessage::ReleaseFloor { respond_to, .. }
            | FloorMessage::BeginThinking { respond_to, .. }
            | FloorMessage::BeginSpeaking { respond_to, .. }
            | FloorMessage::SignalActivity { respond_to, .. }
            | FloorMessage::CancelRequest { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            FloorMessage::RequestFloor { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            FloorMessage::ParticipantDisconnected { .. } | FloorMessage::GetState { .. } => {}
        }
    }
}
