//! Room registry and broadcast fan-out.
//!
//! A room is the set of live connections watching one session code. The
//! registry is owned by the application state and shared by every
//! connection task; all membership changes and deliveries happen under one
//! lock, so a join, leave or broadcast never observes another half done.
//!
//! Delivery never waits on a slow client: each member has a bounded
//! outbound queue and a full queue loses the event for that member only.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use livepoll_common::SessionCode;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::protocol::{RoomEvent, ServerFrame};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::Sender<Arc<ServerFrame>>;

struct Room {
    members: HashMap<String, Outbound>,
    /// Newest aggregate revision delivered to this room, any event.
    last_revision: u64,
    /// Newest revision of a poll-wide event such as `pollClosed`.
    lifecycle_revision: u64,
    /// Newest revision delivered per question, for `pollUpdate`.
    question_revisions: HashMap<String, u64>,
}

impl Room {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
            last_revision: 0,
            lifecycle_revision: 0,
            question_revisions: HashMap::new(),
        }
    }

    /// Highest revision `event` must beat to be delivered.
    fn floor_for(&self, event: &RoomEvent) -> u64 {
        match event {
            RoomEvent::PollUpdate(delta) => self
                .question_revisions
                .get(&delta.question_id)
                .copied()
                .unwrap_or(0)
                .max(self.lifecycle_revision),
            _ => self.last_revision,
        }
    }

    fn record(&mut self, revision: u64, event: &RoomEvent) {
        self.last_revision = self.last_revision.max(revision);
        match event {
            RoomEvent::PollUpdate(delta) => {
                self.question_revisions
                    .insert(delta.question_id.clone(), revision);
            }
            _ => self.lifecycle_revision = revision,
        }
    }

    /// Deliver to every member except `exclude`. Returns how many queues
    /// accepted the frame.
    fn deliver(&self, code: &SessionCode, frame: &Arc<ServerFrame>, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        for (connection_id, tx) in &self.members {
            if exclude == Some(connection_id.as_str()) {
                continue;
            }
            match tx.try_send(Arc::clone(frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        session_code = %code,
                        connection_id = %connection_id,
                        "Outbound queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %connection_id, "Outbound queue closed");
                }
            }
        }
        delivered
    }
}

#[derive(Default)]
struct Inner {
    rooms: HashMap<SessionCode, Room>,
    /// Room of each connection; at most one.
    membership: HashMap<String, SessionCode>,
}

impl Inner {
    /// Remove a connection from its room, telling the rest of the room.
    fn remove_member(&mut self, connection_id: &str) -> Option<SessionCode> {
        let code = self.membership.remove(connection_id)?;
        if let Some(room) = self.rooms.get_mut(&code) {
            room.members.remove(connection_id);
            if room.members.is_empty() {
                self.rooms.remove(&code);
            } else {
                let frame = Arc::new(ServerFrame::Event(RoomEvent::ParticipantLeft {}));
                room.deliver(&code, &frame, None);
            }
        }
        Some(code)
    }
}

/// What a join did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Room the connection was moved out of, if any.
    pub left: Option<SessionCode>,
    /// The connection was already in this room; nothing was broadcast.
    pub already_member: bool,
    /// Room size after the join.
    pub participant_count: usize,
}

/// Process-wide map from session code to room.
#[derive(Default)]
pub struct RoomRegistry {
    inner: Mutex<Inner>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a connection in the room for `code`.
    ///
    /// A connection belongs to at most one room, so joining another room
    /// first leaves the current one. The rest of the new room is told the
    /// new size; the joiner is not.
    pub async fn join(&self, connection_id: &str, outbound: Outbound, code: &SessionCode) -> JoinOutcome {
        let mut inner = self.inner.lock().await;

        if inner.membership.get(connection_id) == Some(code) {
            let participant_count = inner.rooms.get(code).map_or(0, |r| r.members.len());
            return JoinOutcome {
                left: None,
                already_member: true,
                participant_count,
            };
        }

        let left = inner.remove_member(connection_id);

        let room = inner.rooms.entry(code.clone()).or_insert_with(Room::new);
        room.members.insert(connection_id.to_string(), outbound);
        let participant_count = room.members.len();
        let frame = Arc::new(ServerFrame::Event(RoomEvent::ParticipantJoined {
            participant_count,
        }));
        room.deliver(code, &frame, Some(connection_id));

        inner
            .membership
            .insert(connection_id.to_string(), code.clone());

        debug!(session_code = %code, connection_id, participant_count, "Joined room");
        JoinOutcome {
            left,
            already_member: false,
            participant_count,
        }
    }

    /// Take a connection out of its room. Leaving without a room is a no-op.
    pub async fn leave(&self, connection_id: &str) -> Option<SessionCode> {
        let left = self.inner.lock().await.remove_member(connection_id);
        if let Some(code) = &left {
            debug!(session_code = %code, connection_id, "Left room");
        }
        left
    }

    /// Deliver an unordered event to a room, optionally skipping one member.
    pub async fn broadcast(&self, code: &SessionCode, event: RoomEvent, exclude: Option<&str>) -> usize {
        let inner = self.inner.lock().await;
        inner.rooms.get(code).map_or(0, |room| {
            room.deliver(code, &Arc::new(ServerFrame::Event(event)), exclude)
        })
    }

    /// Deliver an event produced by the aggregate mutation at `revision`.
    ///
    /// `pollUpdate` deltas are ordered per question: a delta is dropped only
    /// when its question already went out at a newer revision, or the poll
    /// was closed at one. Deltas for different questions may therefore arrive
    /// with revisions out of order, each still carrying its question's
    /// latest tally. Poll-wide events must be newer than everything already
    /// delivered. Returns whether the event was delivered.
    pub async fn publish(&self, code: &SessionCode, revision: u64, event: RoomEvent) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(room) = inner.rooms.get_mut(code) else {
            return false;
        };

        let floor = room.floor_for(&event);
        if revision <= floor {
            debug!(
                session_code = %code,
                revision,
                floor,
                event = event.name(),
                "Dropping stale room event"
            );
            return false;
        }

        room.record(revision, &event);
        room.deliver(code, &Arc::new(ServerFrame::Event(event)), None);
        true
    }

    /// Send a final event to a room and remove every member from it.
    ///
    /// Used when the poll behind the room is deleted, so a later poll that
    /// reuses the code starts with an empty room.
    pub async fn dissolve(&self, code: &SessionCode, last_event: Option<RoomEvent>) -> usize {
        let mut inner = self.inner.lock().await;
        let Some(room) = inner.rooms.remove(code) else {
            return 0;
        };

        if let Some(event) = last_event {
            room.deliver(code, &Arc::new(ServerFrame::Event(event)), None);
        }
        for connection_id in room.members.keys() {
            inner.membership.remove(connection_id);
        }

        debug!(session_code = %code, members = room.members.len(), "Room dissolved");
        room.members.len()
    }

    /// Room a connection is in.
    pub async fn room_of(&self, connection_id: &str) -> Option<SessionCode> {
        self.inner.lock().await.membership.get(connection_id).cloned()
    }

    /// Number of connections in a room.
    pub async fn room_size(&self, code: &SessionCode) -> usize {
        self.inner
            .lock()
            .await
            .rooms
            .get(code)
            .map_or(0, |room| room.members.len())
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }
}
