//! Floor domain model.
//!
//! - [`phase`] - `FloorPhase` and its legal transitions
//! - [`queue`] - `FloorQueue` priority queue (priority desc, FIFO within tier)
//! - [`types`] - participants, tokens, state snapshots and outcomes

pub mod phase;
pub mod queue;
pub mod types;

pub use phase::FloorPhase;
pub use queue::{FloorQueue, QueueEntry};
pub use types::{
    DenyReason, FloorDenial, FloorGrant, FloorOutcome, FloorRelease, FloorRequest, FloorState,
    FloorToken, Participant, ParticipantRole, QueuedParticipant, ReleaseReason,
};
