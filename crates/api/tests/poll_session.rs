//! Real-time protocol tests, driving `PollConnection` against the in-memory store.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use livepoll_api::{ConnectionState, PollConnection, RoomEvent, ServerFrame};
use livepoll_common::config::LimitsConfig;
use livepoll_core::Role;
use livepoll_db::Tally;
use serde_json::json;

#[tokio::test]
async fn test_viewer_join_returns_snapshot() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut conn, _rx) = PollConnection::new(state.clone(), None);

    let reply = conn
        .handle_frame(frame("joinPoll", json!({"sessionCode": code.as_str().to_lowercase()})))
        .await;
    let ServerFrame::Ack { id, data } = &reply else {
        panic!("expected ack");
    };
    assert_eq!(*id, Some(1));
    assert!(data.success);

    let poll = serde_json::to_value(data.poll.as_ref().unwrap()).unwrap();
    assert_eq!(poll["sessionCode"], json!(code.as_str()));
    assert_eq!(poll["role"], json!("viewer"));
    assert_eq!(poll["isActive"], json!(true));
    assert_eq!(
        poll["questions"][0]["results"],
        json!([{"option": "Red", "votes": 0}, {"option": "Blue", "votes": 0}])
    );
    assert_eq!(
        conn.state(),
        &ConnectionState::Joined {
            session_code: code.clone(),
            role: Role::Viewer
        }
    );
    assert_eq!(state.rooms.room_size(&code).await, 1);
}

#[tokio::test]
async fn test_join_unknown_code_is_not_found_and_unregistered() {
    let state = state();
    let (mut conn, _rx) = PollConnection::new(state.clone(), None);

    let reply = ack(&conn
        .handle_frame(frame("joinPoll", json!({"sessionCode": "ZZZZZZ"})))
        .await);
    assert_eq!(reply["success"], json!(false));
    assert_eq!(reply["code"], json!("NOT_FOUND"));
    assert_eq!(conn.state(), &ConnectionState::Connected);
    assert!(state.rooms.room_of(conn.id()).await.is_none());
    assert_eq!(state.rooms.room_count().await, 0);
}

#[tokio::test]
async fn test_join_malformed_code_is_invalid_input() {
    let state = state();
    let (mut conn, _rx) = PollConnection::new(state, None);

    for bad in ["", "ABC", "ABC-12", "ABCDEFG"] {
        let reply = ack(&conn
            .handle_frame(frame("joinPoll", json!({"sessionCode": bad})))
            .await);
        assert_eq!(reply["code"], json!("INVALID_INPUT"), "{bad:?} accepted");
    }
}

#[tokio::test]
async fn test_admin_join_requires_identity() {
    let state = state();
    let code = color_poll(&state, "owner").await;

    let (mut anonymous, _rx) = PollConnection::new(state.clone(), None);
    let reply = ack(&anonymous
        .handle_frame(frame(
            "joinPoll",
            json!({"sessionCode": code.as_str(), "role": "admin"}),
        ))
        .await);
    assert_eq!(reply["code"], json!("UNAUTHORIZED"));
    assert_eq!(anonymous.state(), &ConnectionState::Connected);

    let (mut handshake, _rx) = PollConnection::new(state.clone(), Some(admin("owner")));
    let reply = ack(&handshake
        .handle_frame(frame(
            "joinPoll",
            json!({"sessionCode": code.as_str(), "role": "admin"}),
        ))
        .await);
    assert_eq!(reply["success"], json!(true));
    assert_eq!(reply["poll"]["role"], json!("admin"));
}

#[tokio::test]
async fn test_fallback_token_is_not_cached() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut conn, _rx) = PollConnection::new(state, None);

    let reply = ack(&conn
        .handle_frame(frame(
            "joinPoll",
            json!({"sessionCode": code.as_str(), "role": "admin", "adminToken": admin_token("owner")}),
        ))
        .await);
    assert_eq!(reply["success"], json!(true));
    assert!(conn.admin().is_none());

    // The next privileged event needs its own token again.
    let reply = ack(&conn
        .handle_frame(frame("closePoll", json!({"sessionCode": code.as_str()})))
        .await);
    assert_eq!(reply["code"], json!("UNAUTHORIZED"));

    let reply = ack(&conn
        .handle_frame(frame(
            "closePoll",
            json!({"sessionCode": code.as_str(), "adminToken": admin_token("owner")}),
        ))
        .await);
    assert_eq!(reply["success"], json!(true));
}

#[tokio::test]
async fn test_join_notifies_existing_members() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut first, mut first_rx) = PollConnection::new(state.clone(), None);
    let (mut second, mut second_rx) = PollConnection::new(state.clone(), None);

    join(&mut first, &code).await;
    join(&mut second, &code).await;

    let events = events(&mut first_rx);
    assert!(matches!(
        events.as_slice(),
        [RoomEvent::ParticipantJoined {
            participant_count: 2
        }]
    ));
    assert!(event_names(&mut second_rx).is_empty());
}

#[tokio::test]
async fn test_vote_is_broadcast_to_whole_room() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut voter, mut voter_rx) = PollConnection::new(state.clone(), None);
    let (mut watcher, mut watcher_rx) = PollConnection::new(state.clone(), None);
    join(&mut voter, &code).await;
    join(&mut watcher, &code).await;
    events(&mut voter_rx);

    let reply = vote(&mut voter, &code, "p1", json!("Red")).await;
    assert_eq!(reply, json!({"success": true}));

    for rx in [&mut voter_rx, &mut watcher_rx] {
        let events = events(rx);
        let [RoomEvent::PollUpdate(delta)] = events.as_slice() else {
            panic!("expected one pollUpdate, got {events:?}");
        };
        assert_eq!(delta.question_id, "q1");
        assert_eq!(delta.total_participants, 1);
        assert_eq!(
            serde_json::to_value(&delta.tally).unwrap(),
            json!([{"option": "Red", "votes": 1}, {"option": "Blue", "votes": 0}])
        );
    }
}

#[tokio::test]
async fn test_second_vote_on_question_rejected() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut conn, mut rx) = PollConnection::new(state.clone(), None);
    join(&mut conn, &code).await;

    assert_eq!(vote(&mut conn, &code, "p1", json!("Red")).await["success"], json!(true));
    let reply = vote(&mut conn, &code, "p1", json!("Blue")).await;
    assert_eq!(reply["code"], json!("ALREADY_VOTED"));

    // Only the accepted vote was broadcast.
    assert_eq!(event_names(&mut rx), vec!["pollUpdate"]);
    let poll = state.poll_service.show(&code).await.unwrap();
    assert_eq!(poll.responses.len(), 1);
}

#[tokio::test]
async fn test_invalid_vote_value_rejected() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut conn, mut rx) = PollConnection::new(state, None);
    join(&mut conn, &code).await;

    let reply = vote(&mut conn, &code, "p1", json!("red")).await;
    assert_eq!(reply["code"], json!("INVALID_INPUT"));
    assert!(event_names(&mut rx).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_red_blue_concurrent_votes() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut watcher, mut watcher_rx) = PollConnection::new(state.clone(), None);
    join(&mut watcher, &code).await;

    let handles: Vec<_> = [("p1", "Red"), ("p2", "Red"), ("p3", "Blue")]
        .into_iter()
        .map(|(participant, choice)| {
            let state = state.clone();
            let code = code.clone();
            tokio::spawn(async move {
                let (mut conn, _rx) = PollConnection::new(state, None);
                vote(&mut conn, &code, participant, json!(choice)).await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap()["success"], json!(true));
    }

    let updates: Vec<_> = events(&mut watcher_rx)
        .into_iter()
        .filter_map(|e| match e {
            RoomEvent::PollUpdate(delta) => Some(delta),
            _ => None,
        })
        .collect();
    assert!(!updates.is_empty());
    assert!(updates.windows(2).all(|w| w[0].revision < w[1].revision));

    let last = updates.last().unwrap();
    assert_eq!(last.total_participants, 3);
    assert_eq!(
        serde_json::to_value(&last.tally).unwrap(),
        json!([{"option": "Red", "votes": 2}, {"option": "Blue", "votes": 1}])
    );
}

#[tokio::test]
async fn test_close_then_vote_then_viewer_join() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut owner, _owner_rx) = PollConnection::new(state.clone(), Some(admin("owner")));
    let (mut viewer, mut viewer_rx) = PollConnection::new(state.clone(), None);
    join(&mut viewer, &code).await;
    vote(&mut viewer, &code, "p1", json!("Blue")).await;
    events(&mut viewer_rx);

    let reply = ack(&owner
        .handle_frame(frame("closePoll", json!({"sessionCode": code.as_str()})))
        .await);
    assert_eq!(reply["success"], json!(true));

    let events = events(&mut viewer_rx);
    let [RoomEvent::PollClosed(closed)] = events.as_slice() else {
        panic!("expected pollClosed, got {events:?}");
    };
    assert_eq!(closed.final_responses.len(), 1);
    assert_eq!(closed.final_responses[0].value, json!("Blue"));

    let reply = vote(&mut viewer, &code, "p2", json!("Red")).await;
    assert_eq!(reply["code"], json!("CLOSED"));

    let (mut late, _late_rx) = PollConnection::new(state.clone(), None);
    let snapshot = join(&mut late, &code).await;
    assert_eq!(snapshot["success"], json!(true));
    assert_eq!(snapshot["poll"]["isActive"], json!(false));
    assert_eq!(
        snapshot["poll"]["questions"][0]["results"],
        json!([{"option": "Red", "votes": 0}, {"option": "Blue", "votes": 1}])
    );
}

#[tokio::test]
async fn test_close_requires_owner() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut stranger, _rx) = PollConnection::new(state.clone(), Some(admin("someone-else")));

    let reply = ack(&stranger
        .handle_frame(frame("closePoll", json!({"sessionCode": code.as_str()})))
        .await);
    assert_eq!(reply["code"], json!("FORBIDDEN"));
    assert!(state.poll_service.show(&code).await.unwrap().is_active);
}

#[tokio::test]
async fn test_disconnect_without_join_is_silent() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut member, mut member_rx) = PollConnection::new(state.clone(), None);
    join(&mut member, &code).await;

    let (mut idle, _rx) = PollConnection::new(state.clone(), None);
    idle.disconnect().await;
    idle.disconnect().await;

    assert_eq!(idle.state(), &ConnectionState::Disconnected);
    assert!(event_names(&mut member_rx).is_empty());
}

#[tokio::test]
async fn test_disconnect_notifies_room() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut stays, mut stays_rx) = PollConnection::new(state.clone(), None);
    let (mut goes, _goes_rx) = PollConnection::new(state.clone(), None);
    join(&mut stays, &code).await;
    join(&mut goes, &code).await;
    events(&mut stays_rx);

    goes.disconnect().await;
    assert_eq!(event_names(&mut stays_rx), vec!["participantLeft"]);
    assert_eq!(state.rooms.room_size(&code).await, 1);

    // Events after teardown are refused without touching the store.
    let reply = vote(&mut goes, &code, "p9", json!("Red")).await;
    assert_eq!(reply["success"], json!(false));
    assert!(state.poll_service.show(&code).await.unwrap().responses.is_empty());
}

#[tokio::test]
async fn test_joining_another_poll_leaves_the_first() {
    let state = state();
    let first = color_poll(&state, "owner").await;
    let second = color_poll(&state, "owner").await;
    let (mut stays, mut stays_rx) = PollConnection::new(state.clone(), None);
    let (mut moves, _moves_rx) = PollConnection::new(state.clone(), None);
    join(&mut stays, &first).await;
    join(&mut moves, &first).await;
    events(&mut stays_rx);

    join(&mut moves, &second).await;

    assert_eq!(event_names(&mut stays_rx), vec!["participantLeft"]);
    assert_eq!(state.rooms.room_of(moves.id()).await, Some(second));
}

#[tokio::test]
async fn test_join_rate_limited() {
    let state = state_with_limits(LimitsConfig {
        join_max: 2,
        join_window_secs: 60,
        vote_max: 30,
        vote_window_secs: 60,
    });
    let code = color_poll(&state, "owner").await;
    let (mut conn, _rx) = PollConnection::new(state, None);

    assert_eq!(join(&mut conn, &code).await["success"], json!(true));
    assert_eq!(join(&mut conn, &code).await["success"], json!(true));
    let reply = join(&mut conn, &code).await;
    assert_eq!(reply["code"], json!("RATE_LIMITED"));
}

#[tokio::test]
async fn test_vote_rate_limited_per_connection() {
    let state = state_with_limits(LimitsConfig {
        join_max: 10,
        join_window_secs: 60,
        vote_max: 1,
        vote_window_secs: 60,
    });
    let code = color_poll(&state, "owner").await;
    let (mut first, _rx) = PollConnection::new(state.clone(), None);
    let (mut second, _rx2) = PollConnection::new(state.clone(), None);

    assert_eq!(vote(&mut first, &code, "p1", json!("Red")).await["success"], json!(true));
    let reply = vote(&mut first, &code, "p2", json!("Red")).await;
    assert_eq!(reply["code"], json!("RATE_LIMITED"));

    // The limit is keyed by connection, not by participant.
    assert_eq!(vote(&mut second, &code, "p2", json!("Red")).await["success"], json!(true));
}

#[tokio::test]
async fn test_deleted_poll_evicts_room() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut viewer, mut viewer_rx) = PollConnection::new(state.clone(), None);
    join(&mut viewer, &code).await;

    let deleted = state
        .poll_service
        .delete(&admin("owner"), &code)
        .await
        .unwrap();
    assert_eq!(state.dissolve_room(&deleted).await, 1);

    assert_eq!(event_names(&mut viewer_rx), vec!["pollClosed"]);
    assert!(state.rooms.room_of(viewer.id()).await.is_none());
    assert_eq!(join(&mut viewer, &code).await["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_state_follows_dissolved_room() {
    let state = state();
    let code = color_poll(&state, "owner").await;
    let (mut viewer, _viewer_rx) = PollConnection::new(state.clone(), None);
    join(&mut viewer, &code).await;
    assert!(matches!(viewer.state(), ConnectionState::Joined { .. }));

    let deleted = state
        .poll_service
        .delete(&admin("owner"), &code)
        .await
        .unwrap();
    state.dissolve_room(&deleted).await;

    // The next event sees the room is gone before it runs.
    let reply = vote(&mut viewer, &code, "p1", json!("Red")).await;
    assert_eq!(reply["code"], json!("NOT_FOUND"));
    assert_eq!(viewer.state(), &ConnectionState::Connected);
    assert_eq!(viewer.sync_membership().await, &ConnectionState::Connected);
}

#[tokio::test]
async fn test_vote_during_slow_join_is_not_lost() {
    let store = Arc::new(SlowReads::new(Duration::from_millis(100)));
    let state = state_with_store(store);
    let code = color_poll(&state, "owner").await;

    let (mut joiner, mut joiner_rx) = PollConnection::new(state.clone(), None);
    let join_code = code.clone();
    let pending = tokio::spawn(async move {
        let reply = join(&mut joiner, &join_code).await;
        (joiner, reply)
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    let (mut voter, _voter_rx) = PollConnection::new(state.clone(), None);
    assert_eq!(vote(&mut voter, &code, "p1", json!("Red")).await["success"], json!(true));

    let (joiner, reply) = pending.await.unwrap();
    assert_eq!(reply["success"], json!(true));
    assert!(matches!(joiner.state(), ConnectionState::Joined { .. }));
    let snapshot_revision = reply["poll"]["revision"].as_u64().unwrap();

    // Whatever the snapshot missed must arrive as a newer pollUpdate.
    let newer: Vec<_> = events(&mut joiner_rx)
        .into_iter()
        .filter_map(|e| match e {
            RoomEvent::PollUpdate(delta) if delta.revision > snapshot_revision => Some(delta),
            _ => None,
        })
        .collect();
    let red = match newer.last() {
        Some(delta) => serde_json::to_value(&delta.tally).unwrap()[0]["votes"].clone(),
        None => reply["poll"]["questions"][0]["results"][0]["votes"].clone(),
    };
    assert_eq!(red, json!(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_connections_vote_at_once() {
    let state = state();
    let code = color_poll(&state, "owner").await;

    let handles: Vec<_> = (0..250)
        .map(|i| {
            let state = state.clone();
            let code = code.clone();
            tokio::spawn(async move {
                let (mut conn, _rx) = PollConnection::new(state, None);
                join(&mut conn, &code).await;
                let choice = if i % 5 == 0 { "Blue" } else { "Red" };
                vote(&mut conn, &code, &format!("p{i}"), json!(choice)).await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), json!({"success": true}));
    }

    let poll = state.poll_service.show(&code).await.unwrap();
    assert_eq!(poll.responses.len(), 250);
    assert_eq!(poll.voters.len(), 250);
    let Tally::Choices(counts) = &poll.questions[0].tally else {
        panic!("expected choice tally");
    };
    assert_eq!(counts, &vec![200, 50]);
    assert_eq!(counts.iter().sum::<u64>() as usize, poll.responses.len());
}

#[tokio::test]
async fn test_open_text_updates_carry_one_answer() {
    let state = state();
    let code = create_poll(&state, "owner", json!([{"text": "Why?", "kind": "openText"}])).await;
    let (mut watcher, mut watcher_rx) = PollConnection::new(state.clone(), None);
    join(&mut watcher, &code).await;

    for i in 0..20 {
        let (mut conn, _rx) = PollConnection::new(state.clone(), None);
        let reply = vote(&mut conn, &code, &format!("p{i}"), json!(format!("because {i}"))).await;
        assert_eq!(reply["success"], json!(true));
    }

    let events = events(&mut watcher_rx);
    let Some(RoomEvent::PollUpdate(last)) = events.last() else {
        panic!("expected pollUpdate, got {events:?}");
    };
    assert_eq!(
        serde_json::to_value(&last.tally).unwrap(),
        json!({"count": 20, "response": "because 19"})
    );
}

#[tokio::test]
async fn test_malformed_frames_get_negative_ack() {
    let state = state();
    let (mut conn, _rx) = PollConnection::new(state, None);

    let reply = conn.handle_text("not json").await;
    let ServerFrame::Ack { id, data } = &reply else {
        panic!("expected ack");
    };
    assert!(id.is_none());
    assert!(!data.success);

    let reply = conn
        .handle_text(r#"{"id": 4, "event": "dance", "data": {}}"#)
        .await;
    let ServerFrame::Ack { id, data } = &reply else {
        panic!("expected ack");
    };
    assert_eq!(*id, Some(4));
    assert_eq!(data.code, Some("INVALID_INPUT"));
}
