//! Shared fixtures for the api integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use livepoll_api::{AppState, ClientFrame, PollConnection, RoomEvent, ServerFrame};
use livepoll_common::config::{LimitsConfig, SessionConfig};
use livepoll_common::{AppResult, SessionCode};
use livepoll_core::{AdminClaims, AdminIdentity, CreatePollInput, JwtAdminVerifier};
use livepoll_db::{MemoryPollStore, Poll, PollMutation, PollStore};
use serde_json::{Value, json};
use tokio::sync::mpsc;

pub const SECRET: &str = "integration-secret";

pub fn state() -> AppState {
    state_with_limits(LimitsConfig::default())
}

pub fn state_with_limits(limits: LimitsConfig) -> AppState {
    AppState::new(
        Arc::new(MemoryPollStore::new()),
        Arc::new(JwtAdminVerifier::new(SECRET, None)),
        &SessionConfig::default(),
        &limits,
    )
}

pub fn state_with_store(store: Arc<dyn PollStore>) -> AppState {
    AppState::new(
        store,
        Arc::new(JwtAdminVerifier::new(SECRET, None)),
        &SessionConfig::default(),
        &LimitsConfig::default(),
    )
}

/// Memory store whose snapshot reads take `delay`. Writes are not slowed.
pub struct SlowReads {
    pub inner: MemoryPollStore,
    pub delay: Duration,
}

impl SlowReads {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryPollStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl PollStore for SlowReads {
    async fn insert(&self, poll: Poll) -> AppResult<Poll> {
        self.inner.insert(poll).await
    }

    async fn find_by_session_code(&self, code: &SessionCode) -> AppResult<Option<Poll>> {
        let found = self.inner.find_by_session_code(code).await;
        tokio::time::sleep(self.delay).await;
        found
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Poll>> {
        self.inner.find_by_id(id).await
    }

    async fn session_code_exists(&self, code: &SessionCode) -> AppResult<bool> {
        self.inner.session_code_exists(code).await
    }

    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<Poll>> {
        self.inner.list_by_owner(owner).await
    }

    async fn update_if(&self, code: &SessionCode, mutation: PollMutation<'_>) -> AppResult<Poll> {
        self.inner.update_if(code, mutation).await
    }

    async fn delete_by_session_code(&self, code: &SessionCode) -> AppResult<bool> {
        self.inner.delete_by_session_code(code).await
    }
}

pub fn admin(id: &str) -> AdminIdentity {
    AdminIdentity {
        id: id.to_string(),
        name: None,
    }
}

pub fn admin_token(sub: &str) -> String {
    let claims = AdminClaims {
        sub: sub.to_string(),
        role: "admin".to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
        iss: None,
        name: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Create a poll owned by `owner` with the given questions.
pub async fn create_poll(state: &AppState, owner: &str, questions: Value) -> SessionCode {
    let input: CreatePollInput = serde_json::from_value(json!({
        "title": "Standup",
        "durationSecs": 60,
        "questions": questions,
    }))
    .unwrap();
    state
        .poll_service
        .create(&admin(owner), input)
        .await
        .unwrap()
        .session_code
}

pub async fn color_poll(state: &AppState, owner: &str) -> SessionCode {
    create_poll(
        state,
        owner,
        json!([{"text": "Favourite colour?", "kind": "singleChoice", "options": ["Red", "Blue"]}]),
    )
    .await
}

pub fn frame(event: &str, data: Value) -> ClientFrame {
    serde_json::from_value(json!({"id": 1, "event": event, "data": data})).unwrap()
}

/// Ack payload of a server frame, as JSON.
pub fn ack(frame: &ServerFrame) -> Value {
    match frame {
        ServerFrame::Ack { data, .. } => serde_json::to_value(data).unwrap(),
        ServerFrame::Event(event) => panic!("expected ack, got {}", event.name()),
    }
}

pub async fn join(connection: &mut PollConnection, code: &SessionCode) -> Value {
    ack(&connection
        .handle_frame(frame("joinPoll", json!({"sessionCode": code.as_str()})))
        .await)
}

pub async fn vote(
    connection: &mut PollConnection,
    code: &SessionCode,
    participant: &str,
    value: Value,
) -> Value {
    ack(&connection
        .handle_frame(frame(
            "vote",
            json!({
                "sessionCode": code.as_str(),
                "questionId": "q1",
                "participantId": participant,
                "value": value,
            }),
        ))
        .await)
}

/// Every room event queued for a connection so far.
pub fn events(rx: &mut mpsc::Receiver<Arc<ServerFrame>>) -> Vec<RoomEvent> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let ServerFrame::Event(event) = frame.as_ref() {
            out.push(event.clone());
        }
    }
    out
}

pub fn event_names(rx: &mut mpsc::Receiver<Arc<ServerFrame>>) -> Vec<&'static str> {
    events(rx).iter().map(RoomEvent::name).collect()
}
