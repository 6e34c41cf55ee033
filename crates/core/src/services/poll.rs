//! Poll service.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use livepoll_common::{AppError, AppResult, IdGenerator, SessionCode};
use livepoll_db::{Poll, PollStore, Question, QuestionKind};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::auth::AdminIdentity;
use super::session_code::SessionCodeAllocator;

/// Most options a single-choice question may declare.
const MAX_OPTIONS: usize = 20;

/// Longest option label, in characters.
const MAX_OPTION_LEN: usize = 200;

/// Input for one question of a new poll.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

/// Input for creating a poll.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    #[validate(length(max = 200))]
    pub title: Option<String>,
    #[validate(range(min = 1))]
    pub duration_secs: i64,
    #[validate(length(min = 1, max = 50), nested)]
    pub questions: Vec<QuestionInput>,
}

/// Normalise a question's options for its kind.
fn normalize_options(index: usize, input: &QuestionInput) -> AppResult<Vec<String>> {
    let declared = input.options.as_deref().unwrap_or_default();
    match input.kind {
        QuestionKind::YesNo => Ok(vec!["Yes".to_string(), "No".to_string()]),
        QuestionKind::OpenText | QuestionKind::Rating => {
            if declared.is_empty() {
                Ok(Vec::new())
            } else {
                Err(AppError::InvalidInput(format!(
                    "Question {} takes no options",
                    index + 1
                )))
            }
        }
        QuestionKind::SingleChoice => {
            let mut seen = HashSet::new();
            let mut options = Vec::new();
            for option in declared {
                let option = option.trim();
                if option.is_empty() {
                    return Err(AppError::InvalidInput(format!(
                        "Question {} has an empty option",
                        index + 1
                    )));
                }
                if option.chars().count() > MAX_OPTION_LEN {
                    return Err(AppError::InvalidInput(format!(
                        "Option is too long (max {MAX_OPTION_LEN} chars)"
                    )));
                }
                if seen.insert(option.to_string()) {
                    options.push(option.to_string());
                }
            }
            if options.len() < 2 {
                return Err(AppError::InvalidInput(format!(
                    "Question {} needs at least 2 distinct options",
                    index + 1
                )));
            }
            if options.len() > MAX_OPTIONS {
                return Err(AppError::InvalidInput(format!(
                    "Question {} has more than {MAX_OPTIONS} options",
                    index + 1
                )));
            }
            Ok(options)
        }
    }
}

/// Service for poll administration.
#[derive(Clone)]
pub struct PollService {
    store: Arc<dyn PollStore>,
    allocator: SessionCodeAllocator,
    id_gen: IdGenerator,
    max_duration_secs: i64,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(
        store: Arc<dyn PollStore>,
        allocator: SessionCodeAllocator,
        max_duration_secs: i64,
    ) -> Self {
        Self {
            store,
            allocator,
            id_gen: IdGenerator::new(),
            max_duration_secs,
        }
    }

    /// Create a poll owned by `admin`.
    pub async fn create(&self, admin: &AdminIdentity, input: CreatePollInput) -> AppResult<Poll> {
        input.validate()?;

        if input.duration_secs > self.max_duration_secs {
            return Err(AppError::InvalidInput(format!(
                "Duration cannot exceed {} seconds",
                self.max_duration_secs
            )));
        }

        let mut questions = Vec::with_capacity(input.questions.len());
        for (index, q) in input.questions.iter().enumerate() {
            let text = q.text.trim();
            if text.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Question {} has no text",
                    index + 1
                )));
            }
            questions.push(Question::new(
                format!("q{}", index + 1),
                text.to_string(),
                q.kind,
                normalize_options(index, q)?,
            ));
        }

        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let now = Utc::now();
        let expires_at = now + Duration::seconds(input.duration_secs);
        let id = self.id_gen.generate();

        let poll = self
            .allocator
            .insert_with_fresh_code(|session_code| Poll {
                id: id.clone(),
                session_code,
                title: title.clone(),
                questions: questions.clone(),
                voters: BTreeSet::new(),
                responses: Vec::new(),
                expires_at,
                is_active: true,
                created_by: admin.id.clone(),
                created_at: now,
                closed_at: None,
                revision: 0,
            })
            .await?;

        info!(
            session_code = %poll.session_code,
            admin = %admin.id,
            questions = poll.questions.len(),
            "Poll created"
        );
        Ok(poll)
    }

    /// Polls created by `admin`, newest first.
    pub async fn list(&self, admin: &AdminIdentity) -> AppResult<Vec<Poll>> {
        self.store.list_by_owner(&admin.id).await
    }

    /// Whether an undeleted poll holds `code`.
    pub async fn exists(&self, code: &SessionCode) -> AppResult<bool> {
        self.store.session_code_exists(code).await
    }

    /// Current state of a poll. Closed and expired polls stay readable.
    pub async fn show(&self, code: &SessionCode) -> AppResult<Poll> {
        self.store.get_by_session_code(code).await
    }

    /// Close a poll. Only its creator may close it.
    ///
    /// Closing is final; closing again fails with `Closed`.
    pub async fn close(&self, admin: &AdminIdentity, code: &SessionCode) -> AppResult<Poll> {
        let mutation = |poll: &mut Poll| {
            if poll.created_by != admin.id {
                return Err(AppError::Forbidden("Only the poll creator can close it".to_string()));
            }
            if !poll.is_active {
                return Err(AppError::Closed);
            }
            poll.is_active = false;
            poll.closed_at = Some(Utc::now());
            Ok(())
        };

        let closed = self.store.update_if(code, &mutation).await?;
        info!(session_code = %code, admin = %admin.id, "Poll closed");
        Ok(closed)
    }

    /// Delete a poll with all its responses, freeing its code.
    ///
    /// Returns the poll as it was just before deletion.
    pub async fn delete(&self, admin: &AdminIdentity, code: &SessionCode) -> AppResult<Poll> {
        let poll = self.store.get_by_session_code(code).await?;
        if poll.created_by != admin.id {
            return Err(AppError::Forbidden("Only the poll creator can delete it".to_string()));
        }

        if !self.store.delete_by_session_code(code).await? {
            return Err(AppError::NotFound(format!("Poll not found: {code}")));
        }

        info!(session_code = %code, admin = %admin.id, "Poll deleted");
        Ok(poll)
    }
}
