//! `FloorControllerActor` - singleton supervisor for room coordinators.
//!
//! - Singleton per process
//! - Supervises N `FloorCoordinator` instances, one per room
//! - Handles room creation, lookup and removal, bounded by `max_rooms`
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//! - Reclaims session-opened rooms once their last session has closed and
//!   the floor is vacant
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Stops accepting new rooms
//! 2. Cancels every room (tickets resolve with `ROOM_CLOSED`)
//! 3. Waits for the room tasks, bounded by the shutdown deadline
//! 4. Cancels the root token and exits

use super::coordinator::{FloorCoordinator, FloorCoordinatorHandle};
use super::messages::{ControllerMessage, ControllerStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::config::FloorConfig;
use crate::errors::FcError;
use crate::transport::SessionTransport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How long a removed room gets to finish closing.
const ROOM_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// How often rooms without sessions are checked for reclaim.
const VACANT_ROOM_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to the `FloorControllerActor`.
#[derive(Clone, Debug)]
pub struct FloorControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl FloorControllerActorHandle {
    /// Spawn the controller and return a handle to it.
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Controller instance ID (for logs)
    /// * `floor` - Default floor config for new rooms (must be validated)
    /// * `max_rooms` - Room capacity
    /// * `transport` - Session transport shared by every room
    /// * `metrics` - Shared actor metrics
    #[must_use]
    pub fn new(
        instance_id: String,
        floor: FloorConfig,
        max_rooms: usize,
        transport: Arc<dyn SessionTransport>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Controller, &instance_id));

        let actor = FloorControllerActor {
            instance_id,
            receiver,
            cancel_token: cancel_token.clone(),
            floor,
            max_rooms,
            transport,
            rooms: HashMap::new(),
            accepting_new: true,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            mailbox,
        }
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> ControllerMessage,
    ) -> Result<T, FcError> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.record_enqueue();
        if let Err(e) = self.sender.send(message(tx)).await {
            self.mailbox.record_rejected();
            return Err(FcError::Internal(format!("channel send failed: {e}")));
        }

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Create a room. `floor` overrides the default floor config.
    pub async fn create_room(
        &self,
        room_id: impl Into<String>,
        floor: Option<FloorConfig>,
    ) -> Result<FloorCoordinatorHandle, FcError> {
        let room_id = room_id.into();
        self.call(|respond_to| ControllerMessage::CreateRoom {
            room_id,
            floor,
            respond_to,
        })
        .await?
    }

    pub async fn get_room(
        &self,
        room_id: impl Into<String>,
    ) -> Result<FloorCoordinatorHandle, FcError> {
        let room_id = room_id.into();
        self.call(|respond_to| ControllerMessage::GetRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    /// Open a session on a room, creating it with the default config if
    /// absent.
    ///
    /// Every successful call must be paired with [`Self::close_session`].
    /// A room created here is reclaimed once its last session closes and
    /// the floor is vacant.
    pub async fn open_session(
        &self,
        room_id: impl Into<String>,
    ) -> Result<FloorCoordinatorHandle, FcError> {
        let room_id = room_id.into();
        self.call(|respond_to| ControllerMessage::OpenSession {
            room_id,
            respond_to,
        })
        .await?
    }

    /// Close a session opened with [`Self::open_session`].
    pub async fn close_session(&self, room_id: impl Into<String>) -> Result<(), FcError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(ControllerMessage::CloseSession {
                room_id: room_id.into(),
            })
            .await
            .map_err(|e| {
                self.mailbox.record_rejected();
                FcError::Internal(format!("channel send failed: {e}"))
            })
    }

    /// Close a room. Its outstanding tickets resolve with `ROOM_CLOSED`.
    pub async fn remove_room(&self, room_id: impl Into<String>) -> Result<(), FcError> {
        let room_id = room_id.into();
        self.call(|respond_to| ControllerMessage::RemoveRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    pub async fn get_status(&self) -> Result<ControllerStatus, FcError> {
        self.call(|respond_to| ControllerMessage::GetStatus { respond_to })
            .await
    }

    /// Drain every room, waiting at most `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), FcError> {
        self.call(|respond_to| ControllerMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    handle: FloorCoordinatorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Open sessions on this room.
    sessions: usize,
    /// Created by `open_session`, so reclaimed when vacant.
    session_owned: bool,
}

impl ManagedRoom {
    fn is_reclaimable(&self) -> bool {
        self.session_owned && self.sessions == 0 && self.handle.floor_state().is_vacant()
    }
}

/// The `FloorControllerActor` implementation.
pub struct FloorControllerActor {
    instance_id: String,
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Default floor config for new rooms.
    floor: FloorConfig,
    max_rooms: usize,
    transport: Arc<dyn SessionTransport>,
    rooms: HashMap<String, ManagedRoom>,
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl FloorControllerActor {
    #[instrument(skip_all, name = "fc.actor.controller", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            max_rooms = self.max_rooms,
            "FloorControllerActor started"
        );

        let mut vacancy_check = tokio::time::interval(VACANT_ROOM_SWEEP_INTERVAL);
        vacancy_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "fc.actor.controller",
                        instance_id = %self.instance_id,
                        "FloorControllerActor received cancellation signal"
                    );
                    self.drain_rooms(ROOM_REMOVAL_TIMEOUT).await;
                    break;
                }

                _ = vacancy_check.tick() => {
                    self.reclaim_vacant_rooms();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "fc.actor.controller",
                                instance_id = %self.instance_id,
                                "FloorControllerActor channel closed, exiting"
                            );
                            self.drain_rooms(ROOM_REMOVAL_TIMEOUT).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "FloorControllerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::CreateRoom {
                room_id,
                floor,
                respond_to,
            } => {
                let result = self.create_room(room_id, floor, false);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let result = self
                    .rooms
                    .get(&room_id)
                    .map(|managed| managed.handle.clone())
                    .ok_or(FcError::RoomNotFound(room_id));
                let _ = respond_to.send(result);
            }

            ControllerMessage::OpenSession {
                room_id,
                respond_to,
            } => {
                let result = self.open_session(room_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::CloseSession { room_id } => {
                self.close_session(&room_id);
            }

            ControllerMessage::RemoveRoom {
                room_id,
                respond_to,
            } => {
                let result = self.remove_room(&room_id);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                info!(
                    target: "fc.actor.controller",
                    instance_id = %self.instance_id,
                    room_count = self.rooms.len(),
                    deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "Initiating graceful shutdown"
                );
                self.drain_rooms(deadline).await;
                let _ = respond_to.send(Ok(()));
                self.cancel_token.cancel();
            }
        }
    }

    fn create_room(
        &mut self,
        room_id: String,
        floor: Option<FloorConfig>,
        session_owned: bool,
    ) -> Result<FloorCoordinatorHandle, FcError> {
        if !self.accepting_new {
            return Err(FcError::Draining);
        }
        if room_id.is_empty() {
            return Err(FcError::InvalidRequest("room id must not be empty".to_string()));
        }
        if self.rooms.contains_key(&room_id) {
            return Err(FcError::InvalidRequest("room already exists".to_string()));
        }
        if self.rooms.len() >= self.max_rooms {
            warn!(
                target: "fc.actor.controller",
                instance_id = %self.instance_id,
                max_rooms = self.max_rooms,
                "Room capacity reached, rejecting room"
            );
            return Err(FcError::RoomCapacityExceeded {
                max: self.max_rooms,
            });
        }

        let floor = match floor {
            Some(floor) => {
                floor
                    .validate()
                    .map_err(|e| FcError::Config(e.to_string()))?;
                floor
            }
            None => self.floor,
        };

        debug!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            room_id = %room_id,
            "Creating room coordinator"
        );

        let (handle, task_handle) = FloorCoordinator::spawn(
            room_id.clone(),
            floor,
            Arc::clone(&self.transport),
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
                sessions: 0,
                session_owned,
            },
        );
        self.metrics.room_created();

        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room coordinator created"
        );

        Ok(handle)
    }

    fn open_session(&mut self, room_id: String) -> Result<FloorCoordinatorHandle, FcError> {
        if !self.rooms.contains_key(&room_id) {
            self.create_room(room_id.clone(), None, true)?;
        }
        let managed = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| FcError::Internal("room missing after create".to_string()))?;
        managed.sessions += 1;
        Ok(managed.handle.clone())
    }

    fn close_session(&mut self, room_id: &str) {
        let Some(managed) = self.rooms.get_mut(room_id) else {
            return;
        };
        managed.sessions = managed.sessions.saturating_sub(1);

        if managed.is_reclaimable() {
            self.reclaim_room(room_id);
        }
    }

    /// Remove session-opened rooms left with no sessions and a vacant floor.
    fn reclaim_vacant_rooms(&mut self) {
        let vacant: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.is_reclaimable())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in vacant {
            self.reclaim_room(&room_id);
        }
    }

    fn reclaim_room(&mut self, room_id: &str) {
        debug!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            room_id = %room_id,
            "Reclaiming vacant room"
        );
        if let Err(e) = self.remove_room(room_id) {
            warn!(
                target: "fc.actor.controller",
                instance_id = %self.instance_id,
                room_id = %room_id,
                error = %e,
                "Failed to reclaim room"
            );
        }
    }

    /// Cancel a room without blocking the message loop on its exit.
    fn remove_room(&mut self, room_id: &str) -> Result<(), FcError> {
        let managed = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| FcError::RoomNotFound(room_id.to_string()))?;

        managed.handle.cancel();

        let room_id_owned = room_id.to_string();
        let instance_id = self.instance_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(ROOM_REMOVAL_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "fc.actor.controller",
                        instance_id = %instance_id,
                        room_id = %room_id_owned,
                        "Room coordinator closed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "fc.actor.controller",
                        instance_id = %instance_id,
                        room_id = %room_id_owned,
                        error = ?e,
                        "Room coordinator panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "fc.actor.controller",
                        instance_id = %instance_id,
                        room_id = %room_id_owned,
                        "Room coordinator close timed out"
                    );
                }
            }
        });

        self.metrics.room_removed();

        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room coordinator removed"
        );

        Ok(())
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            instance_id: self.instance_id.clone(),
            room_count: self.rooms.len(),
            is_draining: !self.accepting_new,
            total_grants: self.metrics.grant_count(),
        }
    }

    /// Stop accepting rooms, close every room and wait up to `deadline`.
    async fn drain_rooms(&mut self, deadline: Duration) {
        self.accepting_new = false;
        if self.rooms.is_empty() {
            return;
        }

        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            room_count = self.rooms.len(),
            "Closing all rooms"
        );

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        let rooms: Vec<(String, ManagedRoom)> = self.rooms.drain().collect();
        let room_count = rooms.len();
        let instance_id = self.instance_id.clone();

        let wait_all = async {
            for (room_id, managed) in rooms {
                if let Err(e) = managed.task_handle.await {
                    warn!(
                        target: "fc.actor.controller",
                        instance_id = %instance_id,
                        room_id = %room_id,
                        error = ?e,
                        "Room coordinator panicked during shutdown"
                    );
                }
            }
        };

        if tokio::time::timeout(deadline, wait_all).await.is_err() {
            warn!(
                target: "fc.actor.controller",
                instance_id = %self.instance_id,
                "Room shutdown deadline exceeded"
            );
        }

        for _ in 0..room_count {
            self.metrics.room_removed();
        }

        info!(
            target: "fc.actor.controller",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Drop rooms whose task ended on its own, recording panics.
    async fn check_room_health(&mut self) {
        let finished: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    info!(
                        target: "fc.actor.controller",
                        instance_id = %self.instance_id,
                        room_id = %room_id,
                        "Room coordinator exited"
                    );
                }
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "fc.actor.controller",
                        instance_id = %self.instance_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room coordinator panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
                Err(join_error) => {
                    warn!(
                        target: "fc.actor.controller",
                        instance_id = %self.instance_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room coordinator task cancelled"
                    );
                }
            }

            self.metrics.room_removed();
        }
    }
}
