//! Poll store adapter interface.

use async_trait::async_trait;
use livepoll_common::{AppError, AppResult, SessionCode};

use crate::document::Poll;

/// A precondition-checked mutation.
///
/// Called once, against a private copy of the latest committed aggregate,
/// while the store holds that poll exclusively. Returning an error aborts the
/// update without committing; the error is handed back to the caller
/// unchanged.
pub type PollMutation<'a> = &'a (dyn Fn(&mut Poll) -> AppResult<()> + Send + Sync);

/// Abstract document store holding poll aggregates.
///
/// Implementations must make `update_if` atomic: the mutation's checks and
/// its writes commit together or not at all, and two concurrent updates of
/// the same poll can never both commit against the same revision.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a new poll. Fails with `DuplicateSessionCode` if another
    /// undeleted poll already holds the code.
    async fn insert(&self, poll: Poll) -> AppResult<Poll>;

    /// Find an undeleted poll by session code.
    async fn find_by_session_code(&self, code: &SessionCode) -> AppResult<Option<Poll>>;

    /// Find an undeleted poll by internal id.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Poll>>;

    /// Whether an undeleted poll currently holds the code.
    async fn session_code_exists(&self, code: &SessionCode) -> AppResult<bool>;

    /// Undeleted polls created by an admin, newest first.
    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<Poll>>;

    /// Apply `mutation` atomically. Concurrent updates of the same poll wait
    /// for each other rather than fail.
    ///
    /// Returns the committed aggregate with its revision bumped.
    async fn update_if(&self, code: &SessionCode, mutation: PollMutation<'_>) -> AppResult<Poll>;

    /// Delete a poll and everything embedded in it, freeing its code.
    /// Returns whether a poll was deleted.
    async fn delete_by_session_code(&self, code: &SessionCode) -> AppResult<bool>;

    /// Find a poll by session code, failing with `NotFound` if absent.
    async fn get_by_session_code(&self, code: &SessionCode) -> AppResult<Poll> {
        self.find_by_session_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {code}")))
    }
}
