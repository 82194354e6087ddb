//! Actor model implementation for the Floor Controller.
//!
//! ```text
//! FloorControllerActor (singleton per process)
//! └── supervises N FloorCoordinators
//!     └── FloorCoordinator (one per room)
//!         ├── owns phase, holder, token and queue
//!         └── runs the expiry watchdog
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per room**: every floor operation for a room is serialized on
//!   its task; rooms run in parallel
//! - **CancellationToken propagation**: the controller hands each room a child
//!   token, so cancelling the controller closes every room
//! - **Mailbox monitoring**: depth thresholds with metrics (Room: 100/500,
//!   Controller: 50/200)
//!
//! # Modules
//!
//! - [`controller`] - `FloorControllerActor` supervising rooms
//! - [`coordinator`] - `FloorCoordinator` per room
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod controller;
pub mod coordinator;
pub mod messages;
pub mod metrics;

pub use controller::{FloorControllerActor, FloorControllerActorHandle};
pub use coordinator::{FloorCoordinator, FloorCoordinatorHandle, FloorTicket};
pub use messages::{ControllerStatus, RequestAccepted};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
