//! API endpoints.

mod polls;

use axum::Router;

use crate::middleware::AppState;

pub use polls::{DeletedPoll, PollDetails, SessionCodeRequest};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new().nest("/polls", polls::router())
}
