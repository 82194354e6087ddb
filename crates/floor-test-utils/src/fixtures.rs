//! Test fixtures: participants, floor configs and a single-room harness.

use crate::mock_transport::RecordingTransport;

use floor_controller::actors::{ActorMetrics, FloorCoordinator, FloorCoordinatorHandle};
use floor_controller::config::FloorConfig;
use floor_controller::floor::{Participant, ParticipantRole};

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Participant builders.
pub struct TestParticipant;

impl TestParticipant {
    pub fn human(id: &str) -> Participant {
        Participant::new(id, display_name(id)).with_role(ParticipantRole::Human)
    }

    pub fn ai(id: &str) -> Participant {
        Participant::new(id, display_name(id)).with_role(ParticipantRole::Ai)
    }
}

fn display_name(id: &str) -> String {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Floor config with short timers for interleaving tests.
pub fn fast_floor_config() -> FloorConfig {
    FloorConfig {
        max_duration: Duration::from_secs(3),
        cooldown: Duration::from_millis(50),
        activity_timeout: Duration::from_secs(1),
        ..FloorConfig::default()
    }
}

/// One coordinator wired to a `RecordingTransport`.
pub struct TestRoom {
    pub handle: FloorCoordinatorHandle,
    pub transport: RecordingTransport,
    pub metrics: Arc<ActorMetrics>,
    pub task: JoinHandle<()>,
}

impl TestRoom {
    /// Spawn with the default floor config.
    pub fn spawn(room_id: &str) -> Self {
        Self::spawn_with(room_id, FloorConfig::default())
    }

    pub fn spawn_with(room_id: &str, config: FloorConfig) -> Self {
        let transport = RecordingTransport::new();
        let metrics = ActorMetrics::new();
        let (handle, task) = FloorCoordinator::spawn(
            room_id.to_string(),
            config,
            Arc::new(transport.clone()),
            CancellationToken::new(),
            Arc::clone(&metrics),
        );
        Self {
            handle,
            transport,
            metrics,
            task,
        }
    }

    /// Cancel the room and wait for its task.
    pub async fn close(self) {
        self.handle.cancel();
        self.task.await.unwrap();
    }
}
