//! In-process poll store.
//!
//! `update_if` runs the mutation and the commit under a single write-lock
//! acquisition.

use std::collections::HashMap;

use async_trait::async_trait;
use livepoll_common::{AppError, AppResult, SessionCode};
use tokio::sync::RwLock;

use crate::document::Poll;
use crate::store::{PollMutation, PollStore};

#[derive(Default)]
struct Inner {
    /// Polls by internal id.
    polls: HashMap<String, Poll>,
    /// Live session codes.
    by_code: HashMap<SessionCode, String>,
}

/// Poll store backed by process memory.
#[derive(Default)]
pub struct MemoryPollStore {
    inner: RwLock<Inner>,
}

impl MemoryPollStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of undeleted polls.
    pub async fn len(&self) -> usize {
        self.inner.read().await.polls.len()
    }

    /// Whether the store holds no polls.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn insert(&self, mut poll: Poll) -> AppResult<Poll> {
        let mut inner = self.inner.write().await;
        if inner.by_code.contains_key(&poll.session_code) {
            return Err(AppError::DuplicateSessionCode(poll.session_code.to_string()));
        }
        if inner.polls.contains_key(&poll.id) {
            return Err(AppError::Conflict(format!("Poll id already exists: {}", poll.id)));
        }

        poll.revision = 1;
        inner
            .by_code
            .insert(poll.session_code.clone(), poll.id.clone());
        inner.polls.insert(poll.id.clone(), poll.clone());
        Ok(poll)
    }

    async fn find_by_session_code(&self, code: &SessionCode) -> AppResult<Option<Poll>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_code
            .get(code)
            .and_then(|id| inner.polls.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Poll>> {
        Ok(self.inner.read().await.polls.get(id).cloned())
    }

    async fn session_code_exists(&self, code: &SessionCode) -> AppResult<bool> {
        Ok(self.inner.read().await.by_code.contains_key(code))
    }

    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<Poll>> {
        let inner = self.inner.read().await;
        let mut polls: Vec<Poll> = inner
            .polls
            .values()
            .filter(|p| p.created_by == owner)
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(polls)
    }

    async fn update_if(&self, code: &SessionCode, mutation: PollMutation<'_>) -> AppResult<Poll> {
        let mut inner = self.inner.write().await;
        let id = inner
            .by_code
            .get(code)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {code}")))?;
        let stored = inner
            .polls
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {code}")))?;

        // Mutate a copy so a failed precondition leaves the stored poll untouched.
        let mut next = stored.clone();
        mutation(&mut next)?;
        next.revision = stored.revision + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete_by_session_code(&self, code: &SessionCode) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.by_code.remove(code) {
            Some(id) => {
                inner.polls.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
