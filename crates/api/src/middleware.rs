//! Application state and request middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use livepoll_common::config::{LimitsConfig, SessionConfig};
use livepoll_core::{AdminVerifier, PollClosed, PollService, SessionCodeAllocator, VoteProcessor};
use livepoll_db::{Poll, PollStore};
use tracing::debug;

use crate::protocol::RoomEvent;
use crate::rate_limit::RateLimiterState;
use crate::rooms::RoomRegistry;

/// Application state shared by every request and connection task.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: PollService,
    pub vote_processor: VoteProcessor,
    pub rooms: Arc<RoomRegistry>,
    pub limiter: RateLimiterState,
    pub verifier: Arc<dyn AdminVerifier>,
    /// Outbound queue depth per connection.
    pub outbound_buffer: usize,
}

impl AppState {
    /// Wire the services around one poll store.
    pub fn new(
        store: Arc<dyn PollStore>,
        verifier: Arc<dyn AdminVerifier>,
        sessions: &SessionConfig,
        limits: &LimitsConfig,
    ) -> Self {
        let allocator = SessionCodeAllocator::new(store.clone(), sessions.code_max_attempts);
        Self {
            poll_service: PollService::new(store.clone(), allocator, sessions.max_duration_secs),
            vote_processor: VoteProcessor::new(store),
            rooms: Arc::new(RoomRegistry::new()),
            limiter: RateLimiterState::new(limits),
            verifier,
            outbound_buffer: sessions.outbound_buffer.max(1),
        }
    }

    /// Tell a poll's room that it has been closed.
    pub async fn announce_closed(&self, poll: &Poll) -> bool {
        let event = RoomEvent::PollClosed(PollClosed::build(poll, Utc::now()));
        self.rooms
            .publish(&poll.session_code, poll.revision, event)
            .await
    }

    /// Empty a deleted poll's room. Members of a poll that was still open
    /// receive its final state first.
    pub async fn dissolve_room(&self, poll: &Poll) -> usize {
        let last_event = poll
            .is_active
            .then(|| RoomEvent::PollClosed(PollClosed::build(poll, Utc::now())));
        self.rooms.dissolve(&poll.session_code, last_event).await
    }
}

/// Attach the admin identity of a valid `Authorization: Bearer` token to the
/// request. Requests without one pass through anonymous.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.verifier.verify(token) {
            Some(admin) => {
                req.extensions_mut().insert(admin);
            }
            None => debug!("Bearer token rejected"),
        }
    }

    next.run(req).await
}
