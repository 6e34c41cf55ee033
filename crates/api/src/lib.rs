//! HTTP and real-time layer for livepoll.
//!
//! - **Streaming**: the WebSocket poll protocol (`joinPoll`, `vote`, `closePoll`)
//! - **Rooms**: per-poll membership and broadcast fan-out
//! - **Endpoints**: REST administration under `/api/polls`
//! - **Middleware**: admin token authentication, per-connection rate limits
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod connection;
pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod protocol;
pub mod rate_limit;
pub mod response;
pub mod rooms;
pub mod streaming;

use axum::{Router, routing::get};

pub use connection::{ConnectionState, PollConnection};
pub use endpoints::router;
pub use middleware::AppState;
pub use protocol::{Ack, ClientEvent, ClientFrame, RoomEvent, ServerFrame};
pub use rate_limit::{RateLimitConfig, RateLimiterState, SlidingWindowLimiter};
pub use rooms::{JoinOutcome, RoomRegistry};
pub use streaming::streaming_handler;

/// Full application router: `/streaming` and `/api`, with state applied.
///
/// Transport layers such as tracing and CORS are left to the caller.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}
