//! Wire format of the real-time poll protocol.
//!
//! Client frames: `{"id"?: n, "event": "...", "data": {...}}`.
//! Server frames are either an ack for one client frame or a room event:
//!
//! ```json
//! {"type":"ack","id":1,"data":{"success":true,"poll":{...}}}
//! {"type":"event","event":"pollUpdate","data":{...}}
//! ```

#![allow(missing_docs)]

use livepoll_common::AppError;
use livepoll_core::{PollClosed, PollDelta, PollSnapshot, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw client frame, before the event name is dispatched.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    /// Echoed back on the ack so the client can match replies.
    #[serde(default)]
    pub id: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPollPayload {
    pub session_code: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    pub session_code: String,
    pub question_id: String,
    /// String for choice and text questions, string or number for ratings.
    pub value: Value,
    pub participant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosePollPayload {
    pub session_code: String,
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// A decoded client request.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    JoinPoll(JoinPollPayload),
    Vote(VotePayload),
    ClosePoll(ClosePollPayload),
}

impl ClientEvent {
    /// Decode the payload for the frame's event name.
    pub fn from_frame(frame: ClientFrame) -> Result<Self, AppError> {
        fn payload<T: for<'de> Deserialize<'de>>(event: &str, data: Value) -> Result<T, AppError> {
            serde_json::from_value(data)
                .map_err(|e| AppError::InvalidInput(format!("Invalid {event} payload: {e}")))
        }

        match frame.event.as_str() {
            "joinPoll" => payload(&frame.event, frame.data).map(Self::JoinPoll),
            "vote" => payload(&frame.event, frame.data).map(Self::Vote),
            "closePoll" => payload(&frame.event, frame.data).map(Self::ClosePoll),
            other => Err(AppError::InvalidInput(format!("Unknown event: {other}"))),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinPoll(_) => "joinPoll",
            Self::Vote(_) => "vote",
            Self::ClosePoll(_) => "closePoll",
        }
    }
}

/// Reply to one client frame.
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl Ack {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            poll: None,
            message: None,
            code: None,
        }
    }

    #[must_use]
    pub const fn with_poll(poll: PollSnapshot) -> Self {
        Self {
            success: true,
            poll: Some(poll),
            message: None,
            code: None,
        }
    }

    #[must_use]
    pub fn error(err: &AppError) -> Self {
        Self {
            success: false,
            poll: None,
            message: Some(err.client_message()),
            code: Some(err.error_code()),
        }
    }
}

/// Event delivered to every member of a room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomEvent {
    PollUpdate(PollDelta),
    PollClosed(PollClosed),
    ParticipantJoined {
        #[serde(rename = "participantCount")]
        participant_count: usize,
    },
    ParticipantLeft {},
}

impl RoomEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PollUpdate(_) => "pollUpdate",
            Self::PollClosed(_) => "pollClosed",
            Self::ParticipantJoined { .. } => "participantJoined",
            Self::ParticipantLeft {} => "participantLeft",
        }
    }
}

/// Any frame the server writes to a socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        data: Ack,
    },
    Event(RoomEvent),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> ClientFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_join_defaults_to_viewer() {
        let event = ClientEvent::from_frame(frame(json!({
            "id": 7,
            "event": "joinPoll",
            "data": {"sessionCode": "abc123"}
        })))
        .unwrap();

        let ClientEvent::JoinPoll(payload) = event else {
            panic!("expected joinPoll");
        };
        assert_eq!(payload.role, Role::Viewer);
        assert!(payload.admin_token.is_none());
    }

    #[test]
    fn test_decode_vote_keeps_raw_value() {
        let event = ClientEvent::from_frame(frame(json!({
            "event": "vote",
            "data": {"sessionCode": "ABC123", "questionId": "q1", "value": 4, "participantId": "p"}
        })))
        .unwrap();

        let ClientEvent::Vote(payload) = event else {
            panic!("expected vote");
        };
        assert_eq!(payload.value, json!(4));
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        let unknown = ClientEvent::from_frame(frame(json!({"event": "dance"})));
        assert!(matches!(unknown, Err(AppError::InvalidInput(_))));

        let missing = ClientEvent::from_frame(frame(json!({"event": "vote", "data": {}})));
        assert!(matches!(missing, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_server_frame_shapes() {
        let ack = ServerFrame::Ack {
            id: Some(3),
            data: Ack::error(&AppError::AlreadyVoted),
        };
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({
                "type": "ack",
                "id": 3,
                "data": {"success": false, "message": "Already voted on this question", "code": "ALREADY_VOTED"}
            })
        );

        let joined = ServerFrame::Event(RoomEvent::ParticipantJoined {
            participant_count: 2,
        });
        assert_eq!(
            serde_json::to_value(&joined).unwrap(),
            json!({"type": "event", "event": "participantJoined", "data": {"participantCount": 2}})
        );

        let left = ServerFrame::Event(RoomEvent::ParticipantLeft {});
        assert_eq!(
            serde_json::to_value(&left).unwrap(),
            json!({"type": "event", "event": "participantLeft", "data": {}})
        );
    }
}
