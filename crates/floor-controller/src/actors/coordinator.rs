//! `FloorCoordinator` - per-room actor that owns floor state.
//!
//! Each `FloorCoordinator`:
//! - Owns the room's phase, holder, token and request queue
//! - Serializes requests, releases, activity signals and disconnects
//! - Runs the expiry watchdog as a deadline in its own select loop
//! - Publishes every state change to observers, the session transport and
//!   a `watch` channel read by [`FloorCoordinatorHandle::floor_state`]
//!
//! # Watchdog
//!
//! While a token is active the watchdog deadline is
//! `min(token expiry, last activity + activity_timeout)`. Releases and
//! expiries are handled on the same task, so whichever is observed first
//! ends the token and the other finds no holder.
//!
//! # Phases after a token ends
//!
//! | Cause | Next phase |
//! |-------|------------|
//! | release, timeout, room closed | `cooldown`, then `idle` after the cooldown interval |
//! | holder disconnect before speaking | `idle` immediately |
//! | holder disconnect after speaking | `cooldown` |
//!
//! Entering `idle` grants the floor to the head of the queue, if any.

use super::messages::{FloorMessage, RequestAccepted};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::config::FloorConfig;
use crate::errors::FcError;
use crate::floor::{
    DenyReason, FloorDenial, FloorGrant, FloorOutcome, FloorPhase, FloorQueue, FloorRelease,
    FloorRequest, FloorState, FloorToken, Participant, ReleaseReason,
};
use crate::observability::metrics as prom;
use crate::observers::{FloorObservers, Subscription};
use crate::protocol::FloorEvent;
use crate::transport::SessionTransport;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Stand-in deadline for durations too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Handle to a `FloorCoordinator`.
#[derive(Clone, Debug)]
pub struct FloorCoordinatorHandle {
    sender: mpsc::Sender<FloorMessage>,
    cancel_token: CancellationToken,
    room_id: String,
    state: watch::Receiver<FloorState>,
    observers: Arc<FloorObservers>,
    mailbox: Arc<MailboxMonitor>,
}

impl FloorCoordinatorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    async fn send(&self, message: FloorMessage) -> Result<(), FcError> {
        self.mailbox.record_enqueue();
        self.sender.send(message).await.map_err(|e| {
            self.mailbox.record_rejected();
            FcError::Internal(format!("channel send failed: {e}"))
        })
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T, FcError>>) -> FloorMessage,
    ) -> Result<T, FcError> {
        let (tx, rx) = oneshot::channel();
        self.send(message(tx)).await?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Register a participant, or update its role and priority weight.
    ///
    /// The weight is the priority used when a request does not carry one.
    pub async fn register_participant(&self, participant: Participant) -> Result<(), FcError> {
        self.call(|respond_to| FloorMessage::RegisterParticipant {
            participant,
            respond_to,
        })
        .await
    }

    /// Request the floor.
    ///
    /// Grants immediately when the room is idle with an empty queue;
    /// otherwise queues the request. The returned ticket resolves when the
    /// request is granted or leaves the queue.
    ///
    /// # Errors
    ///
    /// - `FloorConflict` if the participant already holds the floor
    /// - `InvalidPriority` if the priority lies outside the room's range
    /// - `QueueFull` if the queue is at capacity
    pub async fn request_floor(
        &self,
        participant_id: impl Into<String>,
        request: FloorRequest,
    ) -> Result<FloorTicket, FcError> {
        let participant_id = participant_id.into();
        let accepted = self
            .call(|respond_to| FloorMessage::RequestFloor {
                participant_id: participant_id.clone(),
                request,
                respond_to,
            })
            .await?;

        Ok(FloorTicket {
            participant_id,
            queue_position: accepted.queue_position,
            outcome: accepted.outcome,
        })
    }

    /// Release the floor. Only the current holder may release.
    pub async fn release_floor(&self, participant_id: impl Into<String>) -> Result<(), FcError> {
        let participant_id = participant_id.into();
        self.call(|respond_to| FloorMessage::ReleaseFloor {
            participant_id,
            respond_to,
        })
        .await
    }

    /// Holder starts composing a response.
    pub async fn begin_thinking(&self, participant_id: impl Into<String>) -> Result<(), FcError> {
        let participant_id = participant_id.into();
        self.call(|respond_to| FloorMessage::BeginThinking {
            participant_id,
            respond_to,
        })
        .await
    }

    /// Holder starts transmitting.
    ///
    /// The first call re-bases the token expiry to now plus the grant's
    /// speaking time.
    pub async fn begin_speaking(&self, participant_id: impl Into<String>) -> Result<(), FcError> {
        let participant_id = participant_id.into();
        self.call(|respond_to| FloorMessage::BeginSpeaking {
            participant_id,
            respond_to,
        })
        .await
    }

    /// Reset the holder's inactivity watchdog.
    pub async fn signal_activity(&self, participant_id: impl Into<String>) -> Result<(), FcError> {
        let participant_id = participant_id.into();
        self.call(|respond_to| FloorMessage::SignalActivity {
            participant_id,
            respond_to,
        })
        .await
    }

    /// Withdraw a queued request. Its ticket resolves with `WITHDRAWN`.
    pub async fn cancel_request(&self, participant_id: impl Into<String>) -> Result<(), FcError> {
        let participant_id = participant_id.into();
        self.call(|respond_to| FloorMessage::CancelRequest {
            participant_id,
            respond_to,
        })
        .await
    }

    /// Notify the coordinator that a participant's session is gone.
    pub async fn participant_disconnected(
        &self,
        participant_id: impl Into<String>,
    ) -> Result<(), FcError> {
        self.send(FloorMessage::ParticipantDisconnected {
            participant_id: participant_id.into(),
        })
        .await
    }

    /// Fetch the state through the mailbox, after every earlier message.
    pub async fn get_state(&self) -> Result<FloorState, FcError> {
        let (tx, rx) = oneshot::channel();
        self.send(FloorMessage::GetState { respond_to: tx }).await?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Latest published state. Never blocks.
    #[must_use]
    pub fn floor_state(&self) -> FloorState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<FloorState> {
        self.state.clone()
    }

    pub fn on_state_change(
        &self,
        observer: impl Fn(&FloorState) + Send + Sync + 'static,
    ) -> Subscription {
        self.observers.state_change.subscribe(observer)
    }

    pub fn on_granted(&self, observer: impl Fn(&FloorToken) + Send + Sync + 'static) -> Subscription {
        self.observers.granted.subscribe(observer)
    }

    /// Queue notices (`QUEUED`, with position changes) and terminal denials.
    pub fn on_denied(
        &self,
        observer: impl Fn(&FloorDenial) + Send + Sync + 'static,
    ) -> Subscription {
        self.observers.denied.subscribe(observer)
    }

    pub fn on_released(
        &self,
        observer: impl Fn(&FloorRelease) + Send + Sync + 'static,
    ) -> Subscription {
        self.observers.released.subscribe(observer)
    }

    /// Close the room.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn mailbox_depth(&self) -> usize {
        self.mailbox.current_depth()
    }
}

/// Pending result of a floor request.
#[derive(Debug)]
#[must_use = "a FloorTicket carries the grant; await outcome() or keep it"]
pub struct FloorTicket {
    participant_id: String,
    queue_position: Option<usize>,
    outcome: oneshot::Receiver<FloorOutcome>,
}

impl FloorTicket {
    #[must_use]
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Position when the request was queued; `None` if granted immediately.
    #[must_use]
    pub fn queue_position(&self) -> Option<usize> {
        self.queue_position
    }

    /// Outcome, if it has already resolved.
    pub fn try_outcome(&mut self) -> Option<FloorOutcome> {
        self.outcome.try_recv().ok()
    }

    /// Wait for the grant or denial.
    pub async fn outcome(self) -> Result<FloorOutcome, FcError> {
        self.outcome
            .await
            .map_err(|_| FcError::Internal("floor ticket dropped by room actor".to_string()))
    }
}

struct Holder {
    token: FloorToken,
    /// Effective speaking time for this grant.
    duration: Duration,
    granted_at: Instant,
    last_activity: Instant,
    token_deadline: Instant,
    has_spoken: bool,
}

struct Waiter {
    respond_to: oneshot::Sender<FloorOutcome>,
    duration: Duration,
    enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Watchdog,
    CooldownEnd,
}

/// The `FloorCoordinator` implementation.
pub struct FloorCoordinator {
    room_id: String,
    config: FloorConfig,
    receiver: mpsc::Receiver<FloorMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    transport: Arc<dyn SessionTransport>,
    observers: Arc<FloorObservers>,
    state_tx: watch::Sender<FloorState>,
    participants: HashMap<String, Participant>,
    phase: FloorPhase,
    holder: Option<Holder>,
    queue: FloorQueue,
    waiters: HashMap<String, Waiter>,
    cooldown_until: Option<Instant>,
    last_state_change: DateTime<Utc>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl FloorCoordinator {
    /// Spawn a coordinator for one room.
    ///
    /// `config` must already be validated.
    pub fn spawn(
        room_id: String,
        config: FloorConfig,
        transport: Arc<dyn SessionTransport>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (FloorCoordinatorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let initial = FloorState::idle(room_id.clone());
        let last_state_change = initial.last_state_change;
        let (state_tx, state) = watch::channel(initial);
        let observers = Arc::new(FloorObservers::default());
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Room, &room_id));

        let actor = Self {
            room_id: room_id.clone(),
            config,
            receiver,
            cancel_token: cancel_token.clone(),
            transport,
            observers: Arc::clone(&observers),
            state_tx,
            participants: HashMap::new(),
            phase: FloorPhase::Idle,
            holder: None,
            queue: FloorQueue::new(),
            waiters: HashMap::new(),
            cooldown_until: None,
            last_state_change,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = FloorCoordinatorHandle {
            sender,
            cancel_token,
            room_id,
            state,
            observers,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "fc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            "FloorCoordinator started"
        );

        loop {
            let timer = self.next_timer();

            tokio::select! {
                // Timers win over queued messages so an expired token is
                // revoked before a late release is looked at.
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "fc.actor.room",
                        room_id = %self.room_id,
                        "FloorCoordinator received cancellation signal"
                    );
                    self.close_room();
                    break;
                }

                () = sleep_until_or_pending(timer.map(|(at, _)| at)) => {
                    if let Some((_, kind)) = timer {
                        self.on_timer(kind);
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "fc.actor.room",
                                room_id = %self.room_id,
                                "FloorCoordinator channel closed, exiting"
                            );
                            self.close_room();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            "FloorCoordinator stopped"
        );
    }

    fn handle_message(&mut self, message: FloorMessage) {
        match message {
            FloorMessage::RegisterParticipant {
                participant,
                respond_to,
            } => {
                let result = self.handle_register(participant);
                let _ = respond_to.send(result);
            }

            FloorMessage::RequestFloor {
                participant_id,
                request,
                respond_to,
            } => {
                let result = self.handle_request(participant_id, request);
                let _ = respond_to.send(result);
            }

            FloorMessage::ReleaseFloor {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_release(&participant_id);
                let _ = respond_to.send(result);
            }

            FloorMessage::BeginThinking {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_begin_thinking(&participant_id);
                let _ = respond_to.send(result);
            }

            FloorMessage::BeginSpeaking {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_begin_speaking(&participant_id);
                let _ = respond_to.send(result);
            }

            FloorMessage::SignalActivity {
                participant_id,
                respond_to,
            } => {
                let result = self.handle_activity(&participant_id);
                let _ = respond_to.send(result);
            }

            FloorMessage::CancelRequest {
                participant_id,
                respond_to,
            } => {
                let result = if self.withdraw(&participant_id, DenyReason::Withdrawn) {
                    Ok(())
                } else {
                    Err(FcError::NotQueued(participant_id))
                };
                let _ = respond_to.send(result);
            }

            FloorMessage::ParticipantDisconnected { participant_id } => {
                self.handle_disconnect(&participant_id);
            }

            FloorMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    fn handle_register(&mut self, participant: Participant) -> Result<(), FcError> {
        self.check_priority(participant.priority_weight)?;

        debug!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %participant.participant_id,
            role = ?participant.role,
            priority_weight = participant.priority_weight,
            "Participant registered"
        );
        self.participants
            .insert(participant.participant_id.clone(), participant);
        Ok(())
    }

    fn handle_request(
        &mut self,
        participant_id: String,
        request: FloorRequest,
    ) -> Result<RequestAccepted, FcError> {
        if self.holder_id() == Some(participant_id.as_str()) {
            return Err(FcError::FloorConflict(participant_id));
        }

        let priority = request
            .priority
            .or_else(|| {
                self.participants
                    .get(&participant_id)
                    .map(|p| p.priority_weight)
            })
            .unwrap_or(self.config.default_priority);
        self.check_priority(priority)?;

        if request.duration.is_some_and(|d| d.is_zero()) {
            return Err(FcError::InvalidRequest(
                "requested duration must be greater than zero".to_string(),
            ));
        }
        let duration = self.config.effective_duration(request.duration);

        let (tx, rx) = oneshot::channel();

        if self.phase == FloorPhase::Idle && self.holder.is_none() && self.queue.is_empty() {
            self.grant(&participant_id, duration, tx);
            return Ok(RequestAccepted {
                queue_position: None,
                outcome: rx,
            });
        }

        if !self.queue.contains(&participant_id)
            && self.queue.len() >= self.config.max_queue_length
        {
            return Err(FcError::QueueFull {
                max: self.config.max_queue_length,
            });
        }

        let before = self.queue.positions();
        let previous_position = self.queue.position(&participant_id);
        self.queue.upsert(&participant_id, priority, Utc::now());

        let waiter = Waiter {
            respond_to: tx,
            duration,
            enqueued_at: Instant::now(),
        };
        if let Some(previous) = self.waiters.insert(participant_id.clone(), waiter) {
            let position = previous_position.unwrap_or_default();
            let _ = previous.respond_to.send(FloorOutcome::Denied {
                reason: DenyReason::Superseded,
                queue_position: position,
            });
            prom::record_denial(DenyReason::Superseded.as_str());
            self.publish_denial(&participant_id, DenyReason::Superseded, position);
        }

        let position = self.queue.position(&participant_id).ok_or_else(|| {
            FcError::Internal("queued participant missing from queue".to_string())
        })?;

        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %participant_id,
            priority,
            position,
            "Floor request queued"
        );
        prom::record_denial(DenyReason::Queued.as_str());
        self.publish_denial(&participant_id, DenyReason::Queued, position);
        self.notify_position_changes(&before, Some(&participant_id));
        self.publish_state();

        Ok(RequestAccepted {
            queue_position: Some(position),
            outcome: rx,
        })
    }

    fn handle_release(&mut self, participant_id: &str) -> Result<(), FcError> {
        self.require_holder(participant_id)?;
        self.end_grant(ReleaseReason::Voluntary);
        Ok(())
    }

    fn handle_begin_thinking(&mut self, participant_id: &str) -> Result<(), FcError> {
        self.require_holder(participant_id)?.last_activity = Instant::now();
        self.set_phase(FloorPhase::Thinking)?;
        self.publish_state();
        Ok(())
    }

    fn handle_begin_speaking(&mut self, participant_id: &str) -> Result<(), FcError> {
        let now = Instant::now();
        let holder = self.require_holder(participant_id)?;
        holder.last_activity = now;
        let rebase = !holder.has_spoken;

        self.set_phase(FloorPhase::Speaking)?;

        if rebase {
            if let Some(holder) = self.holder.as_mut() {
                holder.has_spoken = true;
                holder.token.rebase_expiry(Utc::now());
                holder.token_deadline = deadline_after(now, holder.duration);
            }
        }
        self.publish_state();
        Ok(())
    }

    fn handle_activity(&mut self, participant_id: &str) -> Result<(), FcError> {
        self.require_holder(participant_id)?.last_activity = Instant::now();
        Ok(())
    }

    fn handle_disconnect(&mut self, participant_id: &str) {
        self.participants.remove(participant_id);

        if self.holder_id() == Some(participant_id) {
            info!(
                target: "fc.actor.room",
                room_id = %self.room_id,
                participant_id = %participant_id,
                phase = %self.phase,
                "Floor holder disconnected"
            );
            self.end_grant(ReleaseReason::Disconnected);
        } else if !self.withdraw(participant_id, DenyReason::Disconnected) {
            debug!(
                target: "fc.actor.room",
                room_id = %self.room_id,
                participant_id = %participant_id,
                "Disconnected participant had no floor request"
            );
        }
    }

    fn next_timer(&self) -> Option<(Instant, Timer)> {
        if let Some(holder) = &self.holder {
            let inactive_at = deadline_after(holder.last_activity, self.config.activity_timeout);
            return Some((holder.token_deadline.min(inactive_at), Timer::Watchdog));
        }
        self.cooldown_until.map(|at| (at, Timer::CooldownEnd))
    }

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Watchdog => self.expire_holder(),
            Timer::CooldownEnd => self.finish_cooldown(),
        }
    }

    fn expire_holder(&mut self) {
        let Some(holder) = &self.holder else {
            return;
        };
        let now = Instant::now();
        let over_time = now >= holder.token_deadline;
        let inactive = now >= deadline_after(holder.last_activity, self.config.activity_timeout);
        if !over_time && !inactive {
            return;
        }

        warn!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %holder.token.participant_id,
            token_id = %holder.token.token_id,
            over_time,
            inactive,
            "Floor token expired, revoking"
        );
        self.end_grant(ReleaseReason::Timeout);
    }

    fn finish_cooldown(&mut self) {
        self.cooldown_until = None;
        if self.phase != FloorPhase::Cooldown {
            return;
        }
        self.enter(FloorPhase::Idle);
        self.publish_state();
        self.advance_queue();
    }

    /// End the active token and move to the follow-up phase.
    fn end_grant(&mut self, reason: ReleaseReason) {
        let Some(holder) = self.holder.take() else {
            return;
        };

        let release = FloorRelease {
            room_id: self.room_id.clone(),
            participant_id: holder.token.participant_id.clone(),
            token_id: holder.token.token_id,
            timestamp: Utc::now(),
            reason,
        };

        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %release.participant_id,
            token_id = %release.token_id,
            reason = reason.as_str(),
            "Floor released"
        );
        prom::record_release(reason.as_str());
        prom::record_hold_duration(holder.granted_at.elapsed());

        self.observers.released.notify(&release);
        self.transport
            .broadcast(&self.room_id, &FloorEvent::FloorReleased(release));

        let revoked_before_speaking = reason == ReleaseReason::Disconnected
            && !holder.has_spoken
            && matches!(self.phase, FloorPhase::Preparing | FloorPhase::Thinking);

        if revoked_before_speaking {
            self.enter(FloorPhase::Idle);
            self.publish_state();
            self.advance_queue();
        } else {
            self.cooldown_until = Some(deadline_after(Instant::now(), self.config.cooldown));
            self.enter(FloorPhase::Cooldown);
            self.publish_state();
        }
    }

    /// Grant the floor to the head of the queue, if the room is idle.
    fn advance_queue(&mut self) {
        if self.phase != FloorPhase::Idle || self.holder.is_some() {
            return;
        }

        let before = self.queue.positions();
        while let Some(entry) = self.queue.pop() {
            let Some(waiter) = self.waiters.remove(&entry.participant_id) else {
                error!(
                    target: "fc.actor.room",
                    room_id = %self.room_id,
                    participant_id = %entry.participant_id,
                    "Queue entry without pending ticket, skipping"
                );
                continue;
            };

            prom::record_queue_wait(waiter.enqueued_at.elapsed());
            self.grant(&entry.participant_id, waiter.duration, waiter.respond_to);
            self.notify_position_changes(&before, None);
            return;
        }

        debug!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            "Queue empty, floor idle"
        );
    }

    fn grant(
        &mut self,
        participant_id: &str,
        duration: Duration,
        respond_to: oneshot::Sender<FloorOutcome>,
    ) {
        let now = Instant::now();
        let token = FloorToken::issue(&self.room_id, participant_id, Utc::now(), duration);

        self.holder = Some(Holder {
            token: token.clone(),
            duration,
            granted_at: now,
            last_activity: now,
            token_deadline: deadline_after(now, duration),
            has_spoken: false,
        });
        self.enter(FloorPhase::Preparing);

        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %participant_id,
            token_id = %token.token_id,
            max_duration_ms = token.max_duration_ms,
            "Floor granted"
        );
        self.metrics.record_grant();
        prom::record_grant();

        self.publish_state();

        // Sessions drop their tickets and rely on FLOOR_GRANTED instead.
        let _ = respond_to.send(FloorOutcome::Granted(token.clone()));
        self.observers.granted.notify(&token);

        let grant = FloorGrant {
            room_id: self.room_id.clone(),
            participant_id: participant_id.to_string(),
            timestamp: token.granted_at,
            token,
        };
        self.send_event(participant_id, FloorEvent::FloorGranted(grant));
    }

    /// Remove a queued request and resolve its ticket with `reason`.
    ///
    /// Returns `false` if the participant was not queued.
    fn withdraw(&mut self, participant_id: &str, reason: DenyReason) -> bool {
        let Some(position) = self.queue.position(participant_id) else {
            return false;
        };

        let before = self.queue.positions();
        self.queue.remove(participant_id);
        if let Some(waiter) = self.waiters.remove(participant_id) {
            let _ = waiter.respond_to.send(FloorOutcome::Denied {
                reason,
                queue_position: position,
            });
        }

        info!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            participant_id = %participant_id,
            reason = reason.as_str(),
            position,
            "Floor request removed from queue"
        );
        prom::record_denial(reason.as_str());
        self.publish_denial(participant_id, reason, position);
        self.notify_position_changes(&before, None);
        self.publish_state();
        true
    }

    /// Release the holder and deny every queued request.
    fn close_room(&mut self) {
        if self.holder.is_some() {
            self.end_grant(ReleaseReason::RoomClosed);
        }

        for (index, entry) in self.queue.drain().into_iter().enumerate() {
            let position = index + 1;
            if let Some(waiter) = self.waiters.remove(&entry.participant_id) {
                let _ = waiter.respond_to.send(FloorOutcome::Denied {
                    reason: DenyReason::RoomClosed,
                    queue_position: position,
                });
            }
            prom::record_denial(DenyReason::RoomClosed.as_str());
            self.publish_denial(&entry.participant_id, DenyReason::RoomClosed, position);
        }
        self.waiters.clear();

        self.cooldown_until = None;
        if self.phase == FloorPhase::Cooldown {
            self.enter(FloorPhase::Idle);
        }
        self.publish_state();

        // Answer whatever is still in the mailbox.
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            self.mailbox.record_dequeue();
            match message {
                FloorMessage::GetState { respond_to } => {
                    let _ = respond_to.send(self.snapshot());
                }
                other => {
                    let room_id = self.room_id.clone();
                    other.reject(|| FcError::RoomNotFound(room_id.clone()));
                }
            }
        }
    }

    fn holder_id(&self) -> Option<&str> {
        self.holder
            .as_ref()
            .map(|h| h.token.participant_id.as_str())
    }

    fn require_holder(&mut self, participant_id: &str) -> Result<&mut Holder, FcError> {
        match self.holder.as_mut() {
            Some(holder) if holder.token.participant_id == participant_id => Ok(holder),
            _ => Err(FcError::NotFloorHolder(participant_id.to_string())),
        }
    }

    fn check_priority(&self, priority: u8) -> Result<(), FcError> {
        if self.config.priority_in_range(priority) {
            Ok(())
        } else {
            Err(FcError::InvalidPriority {
                priority,
                min: self.config.priority_min,
                max: self.config.priority_max,
            })
        }
    }

    fn set_phase(&mut self, next: FloorPhase) -> Result<(), FcError> {
        if !self.phase.can_transition_to(next) {
            return Err(FcError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        debug!(
            target: "fc.actor.room",
            room_id = %self.room_id,
            from = %self.phase,
            to = %next,
            "Floor phase transition"
        );
        self.phase = next;
        self.last_state_change = Utc::now();
        Ok(())
    }

    /// Transition whose legality follows from the caller's checks.
    fn enter(&mut self, next: FloorPhase) {
        if let Err(e) = self.set_phase(next) {
            error!(
                target: "fc.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Rejected internal floor transition"
            );
        }
    }

    fn snapshot(&self) -> FloorState {
        FloorState {
            room_id: self.room_id.clone(),
            phase: self.phase,
            current_holder: self.holder_id().map(str::to_string),
            queue: self.queue.snapshot(),
            token_expires_at: self.holder.as_ref().map(|h| h.token.expires_at),
            last_state_change: self.last_state_change,
        }
    }

    fn publish_state(&self) {
        let state = self.snapshot();
        self.state_tx.send_replace(state.clone());
        self.observers.state_change.notify(&state);
        self.transport
            .broadcast(&self.room_id, &FloorEvent::FloorStateChanged(state));
    }

    fn publish_denial(&self, participant_id: &str, reason: DenyReason, queue_position: usize) {
        let denial = FloorDenial {
            room_id: self.room_id.clone(),
            participant_id: participant_id.to_string(),
            timestamp: Utc::now(),
            reason,
            queue_position,
        };
        self.observers.denied.notify(&denial);
        self.send_event(participant_id, FloorEvent::FloorDenied(denial));
    }

    /// Tell queued participants whose position moved, except `skip`.
    fn notify_position_changes(&self, before: &HashMap<String, usize>, skip: Option<&str>) {
        for (participant_id, position) in self.queue.changed_positions(before) {
            if skip == Some(participant_id.as_str()) {
                continue;
            }
            self.publish_denial(&participant_id, DenyReason::Queued, position);
        }
    }

    fn send_event(&self, participant_id: &str, event: FloorEvent) {
        if let Err(e) = self
            .transport
            .send_to_participant(&self.room_id, participant_id, &event)
        {
            debug!(
                target: "fc.actor.room",
                room_id = %self.room_id,
                participant_id = %participant_id,
                event = event.kind(),
                error = %e,
                "Floor event not delivered"
            );
        }
    }
}

fn deadline_after(from: Instant, duration: Duration) -> Instant {
    from.checked_add(duration)
        .unwrap_or_else(|| from + FAR_FUTURE)
}

async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::floor::ParticipantRole;
    use crate::transport::NullTransport;
    use std::sync::Mutex;

    fn spawn_room(config: FloorConfig) -> (FloorCoordinatorHandle, JoinHandle<()>) {
        FloorCoordinator::spawn(
            "room-1".to_string(),
            config,
            Arc::new(NullTransport),
            CancellationToken::new(),
            ActorMetrics::new(),
        )
    }

    fn room() -> FloorCoordinatorHandle {
        spawn_room(FloorConfig::default()).0
    }

    fn priority(p: u8) -> FloorRequest {
        FloorRequest::with_priority(p)
    }

    async fn granted_to(ticket: FloorTicket) -> String {
        match ticket.outcome().await.unwrap() {
            FloorOutcome::Granted(token) => token.participant_id,
            other => panic!("expected grant, got {other:?}"),
        }
    }

    fn record_releases(handle: &FloorCoordinatorHandle) -> Arc<Mutex<Vec<ReleaseReason>>> {
        let releases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&releases);
        let _sub = handle.on_released(move |r| sink.lock().unwrap().push(r.reason));
        releases
    }

    fn record_denials(
        handle: &FloorCoordinatorHandle,
    ) -> Arc<Mutex<Vec<(String, DenyReason, usize)>>> {
        let denials = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&denials);
        let _sub = handle.on_denied(move |d| {
            sink.lock()
                .unwrap()
                .push((d.participant_id.clone(), d.reason, d.queue_position));
        });
        denials
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_grant_when_idle() {
        let handle = room();

        let ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        assert_eq!(ticket.queue_position(), None);
        assert_eq!(granted_to(ticket).await, "alice");

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Preparing);
        assert_eq!(state.current_holder.as_deref(), Some("alice"));
        assert!(state.queue.is_empty());
        assert!(state.token_expires_at.is_some());

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_rerequest_is_conflict() {
        let handle = room();
        let _ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();

        let result = handle.request_floor("alice", FloorRequest::default()).await;
        assert!(matches!(result, Err(FcError::FloorConflict(id)) if id == "alice"));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_while_held_is_queued() {
        let handle = room();
        let _alice = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();

        let mut bob = handle
            .request_floor("bob", FloorRequest::default())
            .await
            .unwrap();

        assert_eq!(bob.queue_position(), Some(1));
        assert!(bob.try_outcome().is_none());
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.queue_position("bob"), Some(1));
        assert_eq!(state.current_holder.as_deref(), Some("alice"));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_with_empty_queue_returns_to_idle() {
        let handle = room();
        let _ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();

        handle.release_floor("alice").await.unwrap();
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Cooldown);
        assert_eq!(state.current_holder, None);

        tokio::time::advance(Duration::from_millis(500)).await;

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Idle);
        assert!(state.queue.is_empty());
        assert_eq!(state.current_holder, None);
        assert_eq!(state.token_expires_at, None);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_during_cooldown_waits_for_idle() {
        let handle = room();
        let _ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        handle.release_floor("alice").await.unwrap();

        let bob = handle
            .request_floor("bob", FloorRequest::default())
            .await
            .unwrap();
        assert_eq!(bob.queue_position(), Some(1));

        let started = Instant::now();
        assert_eq!(granted_to(bob).await, "bob");
        assert!(started.elapsed() >= Duration::from_millis(500));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_grant_order() {
        let handle = room();
        let _holder = handle
            .request_floor("host", FloorRequest::default())
            .await
            .unwrap();

        let p3 = handle.request_floor("p3", priority(3)).await.unwrap();
        let p5 = handle.request_floor("p5", priority(5)).await.unwrap();
        let p1 = handle.request_floor("p1", priority(1)).await.unwrap();
        assert_eq!(p5.queue_position(), Some(1));

        handle.release_floor("host").await.unwrap();
        assert_eq!(granted_to(p5).await, "p5");

        handle.release_floor("p5").await.unwrap();
        assert_eq!(granted_to(p3).await, "p3");

        handle.release_floor("p3").await.unwrap();
        assert_eq!(granted_to(p1).await, "p1");

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_within_priority() {
        let handle = room();
        let _holder = handle
            .request_floor("host", FloorRequest::default())
            .await
            .unwrap();
        let first = handle.request_floor("first", priority(2)).await.unwrap();
        let second = handle.request_floor("second", priority(2)).await.unwrap();

        assert_eq!(second.queue_position(), Some(2));

        handle.release_floor("host").await.unwrap();
        assert_eq!(granted_to(first).await, "first");
        handle.release_floor("first").await.unwrap();
        assert_eq!(granted_to(second).await, "second");

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_holder_is_revoked_and_queue_advances() {
        let handle = room();
        let releases = record_releases(&handle);
        let _alice = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        let bob = handle
            .request_floor("bob", FloorRequest::default())
            .await
            .unwrap();
        let started = Instant::now();

        // No activity from alice: watchdog (10s) then cooldown (500ms)
        assert_eq!(granted_to(bob).await, "bob");
        assert!(started.elapsed() >= Duration::from_millis(10_500));
        assert_eq!(*releases.lock().unwrap(), vec![ReleaseReason::Timeout]);

        // The revoked holder is told through FLOOR_RELEASED, not an error kind of its own.
        let result = handle.release_floor("alice").await;
        assert!(matches!(result, Err(FcError::NotFloorHolder(id)) if id == "alice"));
        let result = handle.signal_activity("alice").await;
        assert!(matches!(result, Err(FcError::NotFloorHolder(_))));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_watchdog_but_not_token_expiry() {
        let handle = room();
        let releases = record_releases(&handle);
        let _ticket = handle
            .request_floor("alice", FloorRequest::default().duration(Duration::from_secs(20)))
            .await
            .unwrap();
        handle.begin_speaking("alice").await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        handle.signal_activity("alice").await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        handle.signal_activity("alice").await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Speaking);
        assert_eq!(state.current_holder.as_deref(), Some("alice"));

        // 20s after speaking started, despite recent activity
        tokio::time::advance(Duration::from_secs(4)).await;

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Cooldown);
        assert_eq!(state.current_holder, None);
        assert_eq!(*releases.lock().unwrap(), vec![ReleaseReason::Timeout]);

        tokio::time::advance(Duration::from_millis(500)).await;

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Idle);
        assert!(state.queue.is_empty());

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_duration_is_capped() {
        let handle = room();
        let ticket = handle
            .request_floor(
                "alice",
                FloorRequest::default().duration(Duration::from_secs(600)),
            )
            .await
            .unwrap();

        let outcome = ticket.outcome().await.unwrap();
        assert_eq!(
            outcome.token().unwrap().max_duration(),
            Duration::from_secs(30)
        );

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_thinking_and_speaking_phases() {
        let handle = room();
        let _ticket = handle
            .request_floor("kiri", FloorRequest::default())
            .await
            .unwrap();

        handle.begin_thinking("kiri").await.unwrap();
        assert_eq!(handle.get_state().await.unwrap().phase, FloorPhase::Thinking);

        handle.begin_speaking("kiri").await.unwrap();
        assert_eq!(handle.get_state().await.unwrap().phase, FloorPhase::Speaking);

        handle.begin_thinking("kiri").await.unwrap();
        assert_eq!(handle.get_state().await.unwrap().phase, FloorPhase::Thinking);

        let result = handle.begin_thinking("kiri").await;
        assert!(matches!(
            result,
            Err(FcError::InvalidTransition {
                from: FloorPhase::Thinking,
                to: FloorPhase::Thinking
            })
        ));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_only_operations() {
        let handle = room();
        let _ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();

        assert!(matches!(
            handle.release_floor("bob").await,
            Err(FcError::NotFloorHolder(_))
        ));
        assert!(matches!(
            handle.begin_speaking("bob").await,
            Err(FcError::NotFloorHolder(_))
        ));
        assert!(matches!(
            handle.signal_activity("bob").await,
            Err(FcError::NotFloorHolder(_))
        ));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.current_holder.as_deref(), Some("alice"));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_request_withdraws() {
        let handle = room();
        let _alice = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        let bob = handle
            .request_floor("bob", FloorRequest::default())
            .await
            .unwrap();

        handle.cancel_request("bob").await.unwrap();

        assert_eq!(
            bob.outcome().await.unwrap(),
            FloorOutcome::Denied {
                reason: DenyReason::Withdrawn,
                queue_position: 1
            }
        );
        assert!(matches!(
            handle.cancel_request("bob").await,
            Err(FcError::NotQueued(_))
        ));
        assert!(handle.get_state().await.unwrap().queue.is_empty());

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerequest_while_queued_supersedes() {
        let handle = room();
        let _alice = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        let _carol = handle.request_floor("carol", priority(3)).await.unwrap();
        let old = handle.request_floor("bob", priority(1)).await.unwrap();
        assert_eq!(old.queue_position(), Some(2));

        let new = handle.request_floor("bob", priority(5)).await.unwrap();

        assert_eq!(new.queue_position(), Some(1));
        assert_eq!(
            old.outcome().await.unwrap(),
            FloorOutcome::Denied {
                reason: DenyReason::Superseded,
                queue_position: 2
            }
        );
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.queue[0].priority, 5);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_disconnect_shifts_only_later_positions() {
        let handle = room();
        let _a = handle
            .request_floor("a", FloorRequest::default())
            .await
            .unwrap();
        let mut b = handle.request_floor("b", FloorRequest::default()).await.unwrap();
        let c = handle.request_floor("c", FloorRequest::default()).await.unwrap();
        let _d = handle.request_floor("d", FloorRequest::default()).await.unwrap();
        let denials = record_denials(&handle);

        handle.participant_disconnected("c").await.unwrap();
        let state = handle.get_state().await.unwrap();

        assert_eq!(
            c.outcome().await.unwrap(),
            FloorOutcome::Denied {
                reason: DenyReason::Disconnected,
                queue_position: 2
            }
        );
        assert!(b.try_outcome().is_none());
        assert_eq!(state.queue_position("b"), Some(1));
        assert_eq!(state.queue_position("d"), Some(2));
        assert_eq!(
            *denials.lock().unwrap(),
            vec![
                ("c".to_string(), DenyReason::Disconnected, 2),
                ("d".to_string(), DenyReason::Queued, 2),
            ]
        );

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_disconnect_before_speaking_skips_cooldown() {
        let handle = room();
        let releases = record_releases(&handle);
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let _sub = handle.on_state_change(move |s| sink.lock().unwrap().push(s.phase));

        let _a = handle
            .request_floor("a", FloorRequest::default())
            .await
            .unwrap();
        let mut b = handle.request_floor("b", FloorRequest::default()).await.unwrap();
        handle.participant_disconnected("a").await.unwrap();
        let state = handle.get_state().await.unwrap();

        assert_eq!(state.phase, FloorPhase::Preparing);
        assert_eq!(state.current_holder.as_deref(), Some("b"));
        assert!(matches!(b.try_outcome(), Some(FloorOutcome::Granted(_))));
        assert_eq!(*releases.lock().unwrap(), vec![ReleaseReason::Disconnected]);
        assert!(!phases.lock().unwrap().contains(&FloorPhase::Cooldown));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_holder_disconnect_while_speaking_cools_down() {
        let handle = room();
        let _a = handle
            .request_floor("a", FloorRequest::default())
            .await
            .unwrap();
        handle.begin_speaking("a").await.unwrap();

        handle.participant_disconnected("a").await.unwrap();

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, FloorPhase::Cooldown);
        assert_eq!(state.current_holder, None);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_validation() {
        let handle = room();

        let result = handle.request_floor("alice", priority(11)).await;
        assert!(matches!(
            result,
            Err(FcError::InvalidPriority {
                priority: 11,
                min: 0,
                max: 10
            })
        ));

        let result = handle
            .register_participant(Participant::new("bob", "Bob").with_priority_weight(42))
            .await;
        assert!(matches!(result, Err(FcError::InvalidPriority { .. })));

        let result = handle
            .request_floor(
                "alice",
                FloorRequest::default().duration(Duration::ZERO),
            )
            .await;
        assert!(matches!(result, Err(FcError::InvalidRequest(_))));

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_registered_weight_is_default_priority() {
        let handle = room();
        handle
            .register_participant(
                Participant::new("kiri", "Kiri")
                    .with_role(ParticipantRole::Ai)
                    .with_priority_weight(7),
            )
            .await
            .unwrap();
        let _holder = handle
            .request_floor("host", FloorRequest::default())
            .await
            .unwrap();
        let _guest = handle
            .request_floor("guest", FloorRequest::default())
            .await
            .unwrap();

        let kiri = handle
            .request_floor("kiri", FloorRequest::default())
            .await
            .unwrap();

        assert_eq!(kiri.queue_position(), Some(1));
        let state = handle.get_state().await.unwrap();
        assert_eq!(state.queue[0].priority, 7);
        assert_eq!(state.queue[1].priority, 1);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full() {
        let (handle, _task) = spawn_room(FloorConfig {
            max_queue_length: 2,
            ..FloorConfig::default()
        });
        let _holder = handle
            .request_floor("host", FloorRequest::default())
            .await
            .unwrap();
        let _a = handle.request_floor("a", FloorRequest::default()).await.unwrap();
        let _b = handle.request_floor("b", FloorRequest::default()).await.unwrap();

        let result = handle.request_floor("c", FloorRequest::default()).await;
        assert!(matches!(result, Err(FcError::QueueFull { max: 2 })));

        // A queued participant may still replace its own request
        let _a2 = handle.request_floor("a", priority(4)).await.unwrap();

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_close_resolves_tickets() {
        let (handle, task) = spawn_room(FloorConfig::default());
        let releases = record_releases(&handle);
        let _alice = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        let bob = handle
            .request_floor("bob", FloorRequest::default())
            .await
            .unwrap();

        handle.cancel();
        task.await.unwrap();

        assert_eq!(
            bob.outcome().await.unwrap(),
            FloorOutcome::Denied {
                reason: DenyReason::RoomClosed,
                queue_position: 1
            }
        );
        assert_eq!(*releases.lock().unwrap(), vec![ReleaseReason::RoomClosed]);
        let state = handle.floor_state();
        assert_eq!(state.phase, FloorPhase::Idle);
        assert!(state.queue.is_empty());

        let result = handle.request_floor("carol", FloorRequest::default()).await;
        assert!(matches!(result, Err(FcError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_floor_state_reads_latest_snapshot() {
        let handle = room();
        assert_eq!(handle.floor_state().phase, FloorPhase::Idle);

        let mut rx = handle.watch_state();
        let _ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase, FloorPhase::Preparing);
        assert_eq!(
            handle.floor_state().current_holder.as_deref(),
            Some("alice")
        );

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_break_room() {
        let handle = room();
        let _bad = handle.on_granted(|_| panic!("observer bug"));

        let ticket = handle
            .request_floor("alice", FloorRequest::default())
            .await
            .unwrap();
        assert_eq!(granted_to(ticket).await, "alice");

        handle.release_floor("alice").await.unwrap();
        assert_eq!(handle.get_state().await.unwrap().phase, FloorPhase::Cooldown);

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribed_observer_stops_receiving() {
        let handle = room();
        let grants = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&grants);
        let sub = handle.on_granted(move |_| *sink.lock().unwrap() += 1);

        let _a = handle
            .request_floor("a", FloorRequest::default())
            .await
            .unwrap();
        sub.unsubscribe();
        handle.release_floor("a").await.unwrap();
        let b = handle.request_floor("b", FloorRequest::default()).await.unwrap();
        assert_eq!(granted_to(b).await, "b");

        assert_eq!(*grants.lock().unwrap(), 1);

        handle.cancel();
    }
}
