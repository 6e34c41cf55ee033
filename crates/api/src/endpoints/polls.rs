//! Poll administration endpoints.

use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use livepoll_common::{AppResult, SessionCode};
use livepoll_core::{CreatePollInput, PollSnapshot, PollSummary, ResponseView, Role};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{extractors::AdminUser, middleware::AppState, response::ApiResponse};

/// Request addressing one poll.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCodeRequest {
    pub session_code: String,
}

/// Full poll state with every response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetails {
    #[serde(flatten)]
    pub snapshot: PollSnapshot,
    pub responses: Vec<ResponseView>,
}

/// Create a poll.
async fn create(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePollInput>,
) -> AppResult<ApiResponse<PollSnapshot>> {
    let poll = state.poll_service.create(&admin, input).await?;
    Ok(ApiResponse::ok(PollSnapshot::build(
        &poll,
        Role::Admin,
        Utc::now(),
    )))
}

/// List the caller's polls.
async fn list(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollSummary>>> {
    let now = Utc::now();
    let polls = state.poll_service.list(&admin).await?;
    Ok(ApiResponse::ok(
        polls.iter().map(|p| PollSummary::build(p, now)).collect(),
    ))
}

/// Show one poll.
async fn show(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<SessionCodeRequest>,
) -> AppResult<ApiResponse<PollDetails>> {
    let code = SessionCode::parse(&req.session_code)?;
    let poll = state.poll_service.show(&code).await?;
    Ok(ApiResponse::ok(PollDetails {
        snapshot: PollSnapshot::build(&poll, Role::Admin, Utc::now()),
        responses: poll.responses.iter().map(ResponseView::from).collect(),
    }))
}

/// Close a poll and tell its room.
async fn close(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<SessionCodeRequest>,
) -> AppResult<ApiResponse<PollSnapshot>> {
    let code = SessionCode::parse(&req.session_code)?;
    let poll = state.poll_service.close(&admin, &code).await?;
    state.announce_closed(&poll).await;
    Ok(ApiResponse::ok(PollSnapshot::build(
        &poll,
        Role::Admin,
        Utc::now(),
    )))
}

/// Deleted poll acknowledgement.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedPoll {
    pub session_code: String,
    pub evicted_connections: usize,
}

/// Delete a poll, emptying its room.
async fn delete(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(req): Json<SessionCodeRequest>,
) -> AppResult<ApiResponse<DeletedPoll>> {
    let code = SessionCode::parse(&req.session_code)?;
    let poll = state.poll_service.delete(&admin, &code).await?;
    let evicted = state.dissolve_room(&poll).await;

    info!(session_code = %code, evicted, "Poll room dissolved");
    Ok(ApiResponse::ok(DeletedPoll {
        session_code: poll.session_code.to_string(),
        evicted_connections: evicted,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/list", post(list))
        .route("/show", post(show))
        .route("/close", post(close))
        .route("/delete", post(delete))
}
