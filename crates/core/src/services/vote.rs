//! Vote processing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult, SessionCode};
use livepoll_db::{Poll, PollStore, Question, QuestionKind, Response, Tally, VoteValue};
use serde_json::Value;
use tracing::{debug, info};

use super::results::PollDelta;

/// Longest accepted open-text answer, in characters.
pub const MAX_TEXT_LEN: usize = 1000;

/// Longest accepted participant id.
pub const MAX_PARTICIPANT_ID_LEN: usize = 128;

/// Turn a raw client value into a typed vote for `question`.
///
/// Choice values must equal a declared option after trimming, compared
/// case-sensitively. Ratings may arrive as a number or a numeric string.
pub fn parse_vote_value(question: &Question, raw: &Value) -> AppResult<VoteValue> {
    match question.kind {
        QuestionKind::SingleChoice | QuestionKind::YesNo => {
            let label = raw
                .as_str()
                .map(str::trim)
                .ok_or_else(|| AppError::InvalidInput("Choice value must be a string".to_string()))?;
            let index = question
                .options
                .iter()
                .position(|option| option == label)
                .ok_or_else(|| AppError::InvalidInput(format!("Unknown option: {label}")))?;
            Ok(VoteValue::Choice {
                index,
                label: label.to_string(),
            })
        }
        QuestionKind::Rating => {
            let rating = match raw {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match rating {
                Some(r @ 1..=5) => Ok(VoteValue::Rating(r as u8)),
                _ => Err(AppError::InvalidInput(
                    "Rating must be an integer from 1 to 5".to_string(),
                )),
            }
        }
        QuestionKind::OpenText => {
            let text = raw
                .as_str()
                .map(str::trim)
                .ok_or_else(|| AppError::InvalidInput("Answer must be a string".to_string()))?;
            if text.is_empty() {
                return Err(AppError::InvalidInput("Answer cannot be empty".to_string()));
            }
            if text.chars().count() > MAX_TEXT_LEN {
                return Err(AppError::InvalidInput(format!(
                    "Answer is too long (max {MAX_TEXT_LEN} chars)"
                )));
            }
            Ok(VoteValue::Text(text.to_string()))
        }
    }
}

/// Apply one vote to the aggregate.
///
/// Checks run in a fixed order: open for voting, then known question, then
/// no earlier answer from this participant, then the value itself. Nothing
/// is modified unless every check passes.
pub fn apply_vote(
    poll: &mut Poll,
    question_id: &str,
    participant_id: &str,
    raw: &Value,
    now: DateTime<Utc>,
) -> AppResult<()> {
    poll.ensure_open_at(now)?;

    let index = poll
        .questions
        .iter()
        .position(|q| q.id == question_id)
        .ok_or_else(|| AppError::InvalidInput(format!("Unknown question: {question_id}")))?;

    if poll.has_response(participant_id, question_id) {
        return Err(AppError::AlreadyVoted);
    }

    let value = parse_vote_value(&poll.questions[index], raw)?;

    match (&mut poll.questions[index].tally, &value) {
        (Tally::Choices(counts), VoteValue::Choice { index, .. }) => {
            if counts.len() <= *index {
                counts.resize(*index + 1, 0);
            }
            counts[*index] += 1;
        }
        (Tally::Ratings(samples), VoteValue::Rating(rating)) => samples.push(*rating),
        (Tally::RawOnly, VoteValue::Text(_)) => {}
        _ => {
            return Err(AppError::Internal(format!(
                "Tally of question {question_id} does not match its kind"
            )));
        }
    }

    poll.responses.push(Response {
        participant_id: participant_id.to_string(),
        question_id: question_id.to_string(),
        value,
        timestamp: now,
    });
    poll.voters.insert(participant_id.to_string());
    Ok(())
}

fn validate_ids(question_id: &str, participant_id: &str) -> AppResult<()> {
    if question_id.trim().is_empty() {
        return Err(AppError::InvalidInput("questionId is required".to_string()));
    }
    if participant_id.trim().is_empty() {
        return Err(AppError::InvalidInput("participantId is required".to_string()));
    }
    if participant_id.len() > MAX_PARTICIPANT_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "participantId is too long (max {MAX_PARTICIPANT_ID_LEN} bytes)"
        )));
    }
    Ok(())
}

/// Validates and applies votes through the store's precondition-checked
/// update.
#[derive(Clone)]
pub struct VoteProcessor {
    store: Arc<dyn PollStore>,
}

impl VoteProcessor {
    #[must_use]
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }

    /// Record one vote and return the delta to broadcast.
    ///
    /// The duplicate check is part of the store mutation, so it runs against
    /// the latest committed state. Of two concurrent submissions for the same
    /// participant and question, the second to reach the store sees the
    /// first's response and fails with `AlreadyVoted`.
    pub async fn submit_vote(
        &self,
        code: &SessionCode,
        question_id: &str,
        participant_id: &str,
        value: &Value,
    ) -> AppResult<PollDelta> {
        validate_ids(question_id, participant_id)?;
        let participant_id = participant_id.trim();

        let mutation = |poll: &mut Poll| apply_vote(poll, question_id, participant_id, value, Utc::now());
        let committed = self.store.update_if(code, &mutation).await.inspect_err(|e| {
            debug!(session_code = %code, question_id, error = %e, "Vote rejected");
        })?;

        let question = committed.question(question_id).ok_or_else(|| {
            AppError::Internal(format!("Question {question_id} vanished after vote"))
        })?;
        let timestamp = committed
            .responses
            .last()
            .map_or_else(Utc::now, |r| r.timestamp);

        info!(
            session_code = %code,
            question_id,
            revision = committed.revision,
            "Vote recorded"
        );
        Ok(PollDelta::of(&committed, question, timestamp))
    }
}
