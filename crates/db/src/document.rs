//! Poll aggregate: the poll plus its embedded questions, tallies and
//! responses, stored and mutated as one document.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use livepoll_common::{AppError, AppResult, SessionCode};
use serde::{Deserialize, Serialize};

/// Kind of question, which decides the shape of accepted values and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    /// Pick exactly one of the declared options.
    SingleChoice,
    /// Pick "Yes" or "No".
    YesNo,
    /// Free text.
    OpenText,
    /// Integer from 1 to 5.
    Rating,
}

impl QuestionKind {
    /// Whether votes must name one of the question's options.
    #[must_use]
    pub const fn is_choice(self) -> bool {
        matches!(self, Self::SingleChoice | Self::YesNo)
    }
}

/// Running results of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "camelCase")]
pub enum Tally {
    /// One counter per option, aligned with `Question::options`.
    Choices(Vec<u64>),
    /// Every accepted rating, in acceptance order.
    Ratings(Vec<u8>),
    /// Open text keeps no tally; the responses are the result.
    RawOnly,
}

/// A question embedded in a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique within the poll.
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    /// Ordered and deduplicated; empty for open-text and rating.
    pub options: Vec<String>,
    pub tally: Tally,
}

impl Question {
    /// Build a question with a zeroed tally for its kind.
    #[must_use]
    pub fn new(id: String, text: String, kind: QuestionKind, options: Vec<String>) -> Self {
        let tally = match kind {
            QuestionKind::SingleChoice | QuestionKind::YesNo => Tally::Choices(vec![0; options.len()]),
            QuestionKind::Rating => Tally::Ratings(Vec::new()),
            QuestionKind::OpenText => Tally::RawOnly,
        };
        Self {
            id,
            text,
            kind,
            options,
            tally,
        }
    }
}

/// A validated vote value, one variant per question kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum VoteValue {
    /// Index into `Question::options` plus the option label.
    Choice { index: usize, label: String },
    Rating(u8),
    Text(String),
}

/// One accepted vote. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub participant_id: String,
    pub question_id: String,
    pub value: VoteValue,
    pub timestamp: DateTime<Utc>,
}

/// The poll aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    /// Opaque, stable identity independent of the session code.
    pub id: String,
    /// Canonical session code, unique among undeleted polls.
    pub session_code: SessionCode,
    pub title: Option<String>,
    pub questions: Vec<Question>,
    /// Every participant with at least one accepted response.
    pub voters: BTreeSet<String>,
    /// Append-only, one entry per accepted vote.
    pub responses: Vec<Response>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every committed mutation.
    pub revision: u64,
}

impl Poll {
    /// Find a question by id.
    #[must_use]
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Whether this participant already answered this question.
    #[must_use]
    pub fn has_response(&self, participant_id: &str, question_id: &str) -> bool {
        self.responses
            .iter()
            .any(|r| r.participant_id == participant_id && r.question_id == question_id)
    }

    /// Responses recorded for one question, in acceptance order.
    pub fn responses_for<'a>(&'a self, question_id: &'a str) -> impl Iterator<Item = &'a Response> {
        self.responses
            .iter()
            .filter(move |r| r.question_id == question_id)
    }

    /// Number of distinct participants who voted.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.voters.len()
    }

    /// Whether `now` is past the expiry cutoff.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check that the poll still accepts votes at `now`.
    ///
    /// An explicitly closed poll reports `Closed` even after its expiry.
    pub fn ensure_open_at(&self, now: DateTime<Utc>) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::Closed);
        }
        if self.is_expired_at(now) {
            return Err(AppError::Expired);
        }
        Ok(())
    }
}

/// The mutable part of a poll as persisted in the `document` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDocument {
    pub questions: Vec<Question>,
    pub voters: BTreeSet<String>,
    pub responses: Vec<Response>,
}

impl From<&Poll> for PollDocument {
    fn from(poll: &Poll) -> Self {
        Self {
            questions: poll.questions.clone(),
            voters: poll.voters.clone(),
            responses: poll.responses.clone(),
        }
    }
}
