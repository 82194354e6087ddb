//! # Floor Controller Test Utilities
//!
//! Shared test utilities for the floor controller.
//!
//! ## Modules
//!
//! - `mock_transport` - `RecordingTransport`, a `SessionTransport` that keeps
//!   every delivered event
//! - `fixtures` - Participants, configs and a room harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use floor_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let room = TestRoom::spawn("room-1");
//!     room.handle.register_participant(TestParticipant::ai("kiri")).await.unwrap();
//!
//!     let ticket = room.handle.request_floor("kiri", Default::default()).await.unwrap();
//!     assert_eq!(room.transport.grants_for("kiri").len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_transport;

pub use fixtures::*;
pub use mock_transport::*;
