//! Event delivery through the session transport.
//!
//! Grants and denials go to the participant they concern; releases and
//! state changes are broadcast to the room.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::time::Duration;

use floor_controller::errors::FcError;
use floor_controller::floor::{
    DenyReason, FloorOutcome, FloorPhase, FloorRequest, ReleaseReason,
};
use floor_controller::protocol::FloorEvent;
use floor_test_utils::{Delivery, TestParticipant, TestRoom};

fn priority(p: u8) -> FloorRequest {
    FloorRequest::with_priority(p)
}

fn queued_positions(room: &TestRoom, participant_id: &str) -> Vec<(DenyReason, usize)> {
    room.transport
        .denials_for(participant_id)
        .into_iter()
        .map(|d| (d.reason, d.queue_position))
        .collect()
}

// ============================================================================
// Grants and queue notices
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_grant_is_sent_only_to_holder() {
    let room = TestRoom::spawn("room-1");
    room.handle
        .register_participant(TestParticipant::ai("kiri"))
        .await
        .unwrap();
    room.handle
        .register_participant(TestParticipant::human("alice"))
        .await
        .unwrap();

    let ticket = room.handle.request_floor("kiri", priority(5)).await.unwrap();
    assert!(ticket.queue_position().is_none());

    let grants = room.transport.grants_for("kiri");
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].token.participant_id, "kiri");
    assert_eq!(grants[0].room_id, "room-1");
    assert!(room.transport.direct_to("alice").is_empty());

    // The grant is preceded by the broadcast state that names the holder.
    let states = room.transport.states();
    let last = states.last().unwrap();
    assert_eq!(last.phase, FloorPhase::Preparing);
    assert_eq!(last.current_holder.as_deref(), Some("kiri"));

    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_position_notices_go_to_moved_participants() {
    let room = TestRoom::spawn("room-1");

    let _holder = room.handle.request_floor("a", priority(1)).await.unwrap();
    let b = room.handle.request_floor("b", priority(3)).await.unwrap();
    let c = room.handle.request_floor("c", priority(5)).await.unwrap();
    let d = room.handle.request_floor("d", priority(1)).await.unwrap();

    assert_eq!(b.queue_position(), Some(1));
    assert_eq!(c.queue_position(), Some(1));
    assert_eq!(d.queue_position(), Some(3));

    room.handle.release_floor("a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let state = room.handle.get_state().await.unwrap();
    assert_eq!(state.current_holder.as_deref(), Some("c"));

    assert_eq!(
        queued_positions(&room, "b"),
        vec![
            (DenyReason::Queued, 1),
            (DenyReason::Queued, 2),
            (DenyReason::Queued, 1),
        ]
    );
    assert_eq!(queued_positions(&room, "c"), vec![(DenyReason::Queued, 1)]);
    assert_eq!(
        queued_positions(&room, "d"),
        vec![(DenyReason::Queued, 3), (DenyReason::Queued, 2)]
    );

    assert_eq!(room.transport.grants_for("c").len(), 1);
    assert!(room.transport.grants_for("b").is_empty());
    assert!(room.transport.grants_for("d").is_empty());

    match c.outcome().await.unwrap() {
        FloorOutcome::Granted(token) => assert_eq!(token.participant_id, "c"),
        other => panic!("expected grant, got {other:?}"),
    }

    drop((b, d));
    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_release_is_broadcast_with_reason() {
    let room = TestRoom::spawn("room-1");

    let ticket = room.handle.request_floor("kiri", priority(2)).await.unwrap();
    let token = ticket.outcome().await.unwrap().token().cloned().unwrap();
    room.handle.begin_speaking("kiri").await.unwrap();
    room.handle.release_floor("kiri").await.unwrap();

    let releases: Vec<_> = room
        .transport
        .deliveries()
        .into_iter()
        .filter(|d| matches!(d.event(), FloorEvent::FloorReleased(_)))
        .collect();
    assert_eq!(releases.len(), 1);
    match &releases[0] {
        Delivery::Broadcast {
            room_id,
            event: FloorEvent::FloorReleased(release),
        } => {
            assert_eq!(room_id, "room-1");
            assert_eq!(release.token_id, token.token_id);
            assert_eq!(release.reason, ReleaseReason::Voluntary);
        }
        other => panic!("expected broadcast release, got {other:?}"),
    }

    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_offline_participant_does_not_stall_room() {
    let room = TestRoom::spawn("room-1");
    room.transport.set_offline("ghost");

    let ticket = room.handle.request_floor("ghost", priority(1)).await.unwrap();
    assert!(matches!(
        ticket.outcome().await.unwrap(),
        FloorOutcome::Granted(_)
    ));
    assert!(room.transport.direct_to("ghost").is_empty());

    // Nobody speaks, so the watchdog takes the floor back.
    tokio::time::sleep(Duration::from_secs(11)).await;
    let state = room.handle.get_state().await.unwrap();
    assert!(state.current_holder.is_none());
    assert_eq!(room.transport.releases()[0].reason, ReleaseReason::Timeout);

    room.close().await;
}

// ============================================================================
// Release / expiry race
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_release_at_expiry_advances_queue_once() {
    let room = TestRoom::spawn("room-1");

    let ticket = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    let token = ticket.outcome().await.unwrap().token().cloned().unwrap();
    let bob = room.handle.request_floor("bob", priority(1)).await.unwrap();

    // Land exactly on the inactivity deadline.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let released = room.handle.release_floor("kiri").await;

    let releases = room.transport.releases();
    assert_eq!(releases.len(), 1, "token must end exactly once");
    assert_eq!(releases[0].token_id, token.token_id);

    match (releases[0].reason, released) {
        (ReleaseReason::Voluntary, Ok(())) => {}
        (ReleaseReason::Timeout, Err(FcError::NotFloorHolder(id))) => assert_eq!(id, "kiri"),
        (reason, result) => panic!("inconsistent outcome: {reason:?} with {result:?}"),
    }

    // Past the cooldown the queue has advanced to bob, once.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let state = room.handle.get_state().await.unwrap();
    assert_eq!(state.current_holder.as_deref(), Some("bob"));
    assert!(state.queue.is_empty());

    assert_eq!(room.transport.grants_for("bob").len(), 1);
    assert_eq!(room.transport.grants_for("kiri").len(), 1);
    assert_eq!(room.transport.releases().len(), 1);
    assert!(matches!(bob.outcome().await.unwrap(), FloorOutcome::Granted(_)));

    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_forced_expiry_while_speaking_cools_down_to_idle() {
    let room = TestRoom::spawn("room-1");

    let _ticket = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    room.handle.begin_speaking("kiri").await.unwrap();

    // Silent past the activity timeout, then past the cooldown.
    tokio::time::sleep(Duration::from_secs(11)).await;
    let state = room.handle.get_state().await.unwrap();
    assert_eq!(state.phase, FloorPhase::Idle);

    let mut phases: Vec<FloorPhase> = room.transport.states().iter().map(|s| s.phase).collect();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            FloorPhase::Preparing,
            FloorPhase::Speaking,
            FloorPhase::Cooldown,
            FloorPhase::Idle,
        ]
    );
    assert_eq!(room.transport.releases()[0].reason, ReleaseReason::Timeout);

    room.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_holder_can_request_again() {
    let room = TestRoom::spawn("room-1");

    let _ticket = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(matches!(
        room.handle.signal_activity("kiri").await,
        Err(FcError::NotFloorHolder(_))
    ));

    let ticket = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    assert!(matches!(
        ticket.outcome().await.unwrap(),
        FloorOutcome::Granted(_)
    ));
    assert_eq!(room.transport.grants_for("kiri").len(), 2);

    room.close().await;
}

// ============================================================================
// Room close
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_room_close_denies_queue_and_releases_holder() {
    let room = TestRoom::spawn("room-1");

    let _holder = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    let yuki = room.handle.request_floor("yuki", priority(4)).await.unwrap();
    let alice = room.handle.request_floor("alice", priority(2)).await.unwrap();
    let transport = room.transport.clone();

    room.close().await;

    assert_eq!(transport.releases().len(), 1);
    assert_eq!(transport.releases()[0].reason, ReleaseReason::RoomClosed);

    assert_eq!(
        yuki.outcome().await.unwrap(),
        FloorOutcome::Denied {
            reason: DenyReason::RoomClosed,
            queue_position: 1,
        }
    );
    assert_eq!(
        alice.outcome().await.unwrap(),
        FloorOutcome::Denied {
            reason: DenyReason::RoomClosed,
            queue_position: 2,
        }
    );

    let last_for_alice = transport.denials_for("alice").pop().unwrap();
    assert_eq!(last_for_alice.reason, DenyReason::RoomClosed);

    let final_state = transport.states().pop().unwrap();
    assert_eq!(final_state.phase, FloorPhase::Idle);
    assert!(final_state.queue.is_empty());
}

// ============================================================================
// Wire shape
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_recorded_events_serialize_with_type_tags() {
    let room = TestRoom::spawn("room-1");

    let _holder = room.handle.request_floor("kiri", priority(1)).await.unwrap();
    let _queued = room.handle.request_floor("yuki", priority(1)).await.unwrap();

    let frames = room.transport.json_frames();
    let types: Vec<&str> = frames
        .iter()
        .map(|f| f["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec![
            "FLOOR_STATE_CHANGED",
            "FLOOR_GRANTED",
            "FLOOR_DENIED",
            "FLOOR_STATE_CHANGED",
        ]
    );

    let denial = &frames[2];
    assert_eq!(denial["participant_id"], "yuki");
    assert_eq!(denial["reason"], "QUEUED");
    assert_eq!(denial["queue_position"], 1);

    room.close().await;
}
