//! Per-connection protocol state machine.
//!
//! A [`PollConnection`] is driven by exactly one task: the WebSocket loop in
//! production, the test body in tests. It turns decoded client events into
//! acks and hands room events to the [`RoomRegistry`](crate::rooms::RoomRegistry).
//!
//! ```text
//! Connected ──joinPoll──▶ Joined(code) ──joinPoll(other)──▶ Joined(other)
//!     │          ▲             │
//!     │          └─room gone───┤
//!     └──────disconnect────────┴──────▶ Disconnected
//! ```

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::Utc;
use livepoll_common::{AppError, AppResult, IdGenerator, SessionCode};
use livepoll_core::{AdminIdentity, PollSnapshot, Role, verify_admin};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::middleware::AppState;
use crate::protocol::{
    Ack, ClientEvent, ClientFrame, ClosePollPayload, JoinPollPayload, RoomEvent, ServerFrame,
    VotePayload,
};
use crate::rate_limit::{RateLimitResult, SlidingWindowLimiter};
use crate::rooms::Outbound;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Joined { session_code: SessionCode, role: Role },
    Disconnected,
}

/// Server side of one real-time client.
pub struct PollConnection {
    id: String,
    app: AppState,
    /// Identity verified at handshake, kept for the connection's lifetime.
    admin: Option<AdminIdentity>,
    state: ConnectionState,
    outbound: Outbound,
}

impl PollConnection {
    /// Open a connection. Room events for it arrive on the returned receiver.
    pub fn new(
        app: AppState,
        admin: Option<AdminIdentity>,
    ) -> (Self, mpsc::Receiver<Arc<ServerFrame>>) {
        let (outbound, rx) = mpsc::channel(app.outbound_buffer);
        let id = IdGenerator::new().generate();
        debug!(connection_id = %id, admin = admin.is_some(), "Connection opened");
        (
            Self {
                id,
                app,
                admin,
                state: ConnectionState::Connected,
                outbound,
            },
            rx,
        )
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[must_use]
    pub const fn admin(&self) -> Option<&AdminIdentity> {
        self.admin.as_ref()
    }

    /// Handle one text frame from the socket and build its ack.
    pub async fn handle_text(&mut self, text: &str) -> ServerFrame {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle_frame(frame).await,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "Undecodable client frame");
                ServerFrame::Ack {
                    id: None,
                    data: Ack::error(&AppError::InvalidInput("Malformed frame".to_string())),
                }
            }
        }
    }

    /// Handle one decoded frame. Failures become negative acks; none of them
    /// ends the connection.
    pub async fn handle_frame(&mut self, frame: ClientFrame) -> ServerFrame {
        let id = frame.id;
        let result = match ClientEvent::from_frame(frame) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => Err(e),
        };

        let data = result.unwrap_or_else(|e| {
            debug!(connection_id = %self.id, code = e.error_code(), error = %e, "Event rejected");
            Ack::error(&e)
        });
        ServerFrame::Ack { id, data }
    }

    /// Run one client event.
    pub async fn dispatch(&mut self, event: ClientEvent) -> AppResult<Ack> {
        if self.state == ConnectionState::Disconnected {
            return Err(AppError::InvalidInput("Connection is closed".to_string()));
        }
        self.sync_membership().await;

        match event {
            ClientEvent::JoinPoll(payload) => self.join_poll(payload).await,
            ClientEvent::Vote(payload) => self.vote(payload).await,
            ClientEvent::ClosePoll(payload) => self.close_poll(payload).await,
        }
    }

    /// Fall back to `Connected` when the registry has dropped this
    /// connection from its room, as happens when the poll is deleted.
    pub async fn sync_membership(&mut self) -> &ConnectionState {
        if let ConnectionState::Joined { session_code, .. } = &self.state
            && self.app.rooms.room_of(&self.id).await.as_ref() != Some(session_code)
        {
            debug!(
                connection_id = %self.id,
                session_code = %session_code,
                "Room gone, back to connected"
            );
            self.state = ConnectionState::Connected;
        }
        &self.state
    }

    async fn join_poll(&mut self, payload: JoinPollPayload) -> AppResult<Ack> {
        self.check_rate(&self.app.limiter.join).await?;
        let code = SessionCode::parse(&payload.session_code)?;

        if payload.role == Role::Admin
            && verify_admin(
                self.app.verifier.as_ref(),
                self.admin.as_ref(),
                payload.admin_token.as_deref(),
            )
            .is_none()
        {
            return Err(AppError::Unauthorized);
        }

        if !self.app.poll_service.exists(&code).await? {
            return Err(AppError::NotFound(format!("Poll not found: {code}")));
        }

        // Register before reading the snapshot. A vote committed in between
        // then reaches this connection as a `pollUpdate` even if the snapshot
        // misses it; the snapshot's revision lets the client drop the rest.
        let outcome = self
            .app
            .rooms
            .join(&self.id, self.outbound.clone(), &code)
            .await;

        let poll = match self.app.poll_service.show(&code).await {
            Ok(poll) => poll,
            Err(e) => {
                self.app.rooms.leave(&self.id).await;
                self.state = ConnectionState::Connected;
                return Err(e);
            }
        };
        self.state = ConnectionState::Joined {
            session_code: code.clone(),
            role: payload.role,
        };

        info!(
            connection_id = %self.id,
            session_code = %code,
            role = ?payload.role,
            participant_count = outcome.participant_count,
            revision = poll.revision,
            "Joined poll"
        );
        Ok(Ack::with_poll(PollSnapshot::build(
            &poll,
            payload.role,
            Utc::now(),
        )))
    }

    async fn vote(&mut self, payload: VotePayload) -> AppResult<Ack> {
        self.check_rate(&self.app.limiter.vote).await?;
        let code = SessionCode::parse(&payload.session_code)?;

        let delta = self
            .app
            .vote_processor
            .submit_vote(
                &code,
                &payload.question_id,
                &payload.participant_id,
                &payload.value,
            )
            .await?;

        let revision = delta.revision;
        self.app
            .rooms
            .publish(&code, revision, RoomEvent::PollUpdate(delta))
            .await;
        Ok(Ack::ok())
    }

    async fn close_poll(&mut self, payload: ClosePollPayload) -> AppResult<Ack> {
        let code = SessionCode::parse(&payload.session_code)?;
        let admin = verify_admin(
            self.app.verifier.as_ref(),
            self.admin.as_ref(),
            payload.admin_token.as_deref(),
        )
        .ok_or(AppError::Unauthorized)?;

        let closed = self.app.poll_service.close(&admin, &code).await?;
        self.app.announce_closed(&closed).await;
        Ok(Ack::ok())
    }

    async fn check_rate(&self, limiter: &SlidingWindowLimiter) -> AppResult<()> {
        match limiter.check(&self.id).await {
            RateLimitResult::Allowed { .. } => Ok(()),
            RateLimitResult::Limited { retry_after, .. } => {
                Err(AppError::RateLimited { retry_after })
            }
        }
    }

    /// Tear the connection down: leave its room and drop its limiter
    /// history. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;

        let left = self.app.rooms.leave(&self.id).await;
        self.app.limiter.forget(&self.id).await;
        debug!(connection_id = %self.id, left = ?left, "Connection closed");
    }
}
