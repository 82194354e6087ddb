//! Floor Controller Library
//!
//! Turn-taking for real-time rooms shared by human participants and
//! AI-driven characters. At any instant at most one participant per room
//! holds the floor (the right to speak); everyone else waits in a priority
//! queue.
//!
//! # Architecture
//!
//! ```text
//! FloorControllerActor (singleton)
//! └── FloorCoordinator (one per room)
//!         │  FloorEvent
//!         ▼
//!    SessionTransport ── ConnectionRegistry ── WebSocket sessions
//! ```
//!
//! A room moves through `idle → preparing → (thinking ⇄) speaking → cooldown
//! → idle`. The coordinator issues a [`floor::FloorToken`] on every grant and
//! revokes it when the holder releases, disconnects, goes silent past the
//! activity timeout, or runs past the token's expiry.
//!
//! # Modules
//!
//! - [`actors`] - Controller and per-room coordinator actors
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with wire error codes
//! - [`floor`] - Floor data model (phases, queue, tokens, snapshots)
//! - [`observability`] - Prometheus metrics and health probes
//! - [`observers`] - Observer registrations for floor events
//! - [`protocol`] - JSON wire format for events and commands
//! - [`routes`] - Axum router
//! - [`transport`] - Session transport seam and the WebSocket session layer

pub mod actors;
pub mod config;
pub mod errors;
pub mod floor;
pub mod observability;
pub mod observers;
pub mod protocol;
pub mod routes;
pub mod transport;
