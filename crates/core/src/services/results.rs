//! Result projection: full snapshots for joiners, deltas for broadcasts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use livepoll_db::{Poll, Question, QuestionKind, Response, Tally, VoteValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Role a connection joins a room with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Viewer,
    Admin,
}

/// Votes for one option of a choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionCount {
    pub option: String,
    pub votes: u64,
}

/// Aggregate of a rating question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub count: usize,
    /// Mean rounded to two decimals; `None` before the first rating.
    pub average: Option<f64>,
    /// Rating value to number of times it was given. Only values seen appear.
    pub distribution: BTreeMap<u8, u64>,
}

/// Aggregate of an open-text question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenTextSummary {
    pub count: usize,
    pub responses: Vec<String>,
}

/// Results of one question, shaped by its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuestionResults {
    Choices(Vec<OptionCount>),
    Rating(RatingSummary),
    OpenText(OpenTextSummary),
}

impl QuestionResults {
    /// Project a question's tally, reading raw text from the poll's responses.
    #[must_use]
    pub fn of(poll: &Poll, question: &Question) -> Self {
        match &question.tally {
            Tally::Choices(counts) => Self::Choices(option_counts(question, counts)),
            Tally::Ratings(samples) => Self::Rating(summarize_ratings(samples)),
            Tally::RawOnly => {
                let responses: Vec<String> = poll
                    .responses_for(&question.id)
                    .filter_map(|r| match &r.value {
                        VoteValue::Text(text) => Some(text.clone()),
                        _ => None,
                    })
                    .collect();
                Self::OpenText(OpenTextSummary {
                    count: responses.len(),
                    responses,
                })
            }
        }
    }
}

/// The newest answer to an open-text question, with the running count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenTextAppend {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Tally carried by a `pollUpdate`.
///
/// Choice and rating aggregates are small and go out whole. Open-text
/// questions only send the answer that was just appended; the full list is
/// left to snapshots and the final state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeltaTally {
    Choices(Vec<OptionCount>),
    Rating(RatingSummary),
    OpenText(OpenTextAppend),
}

impl DeltaTally {
    #[must_use]
    pub fn of(poll: &Poll, question: &Question) -> Self {
        match &question.tally {
            Tally::Choices(counts) => Self::Choices(option_counts(question, counts)),
            Tally::Ratings(samples) => Self::Rating(summarize_ratings(samples)),
            Tally::RawOnly => {
                let mut count = 0;
                let mut response = None;
                for r in poll.responses_for(&question.id) {
                    if let VoteValue::Text(text) = &r.value {
                        count += 1;
                        response = Some(text);
                    }
                }
                Self::OpenText(OpenTextAppend {
                    count,
                    response: response.cloned(),
                })
            }
        }
    }
}

/// Counts in option order. Options past the end of `counts` have no votes yet.
fn option_counts(question: &Question, counts: &[u64]) -> Vec<OptionCount> {
    question
        .options
        .iter()
        .zip(counts.iter().copied().chain(std::iter::repeat(0)))
        .map(|(option, votes)| OptionCount {
            option: option.clone(),
            votes,
        })
        .collect()
}

fn summarize_ratings(samples: &[u8]) -> RatingSummary {
    let mut distribution = BTreeMap::new();
    for &value in samples {
        *distribution.entry(value).or_insert(0) += 1;
    }

    let average = if samples.is_empty() {
        None
    } else {
        let sum: u64 = samples.iter().map(|&v| u64::from(v)).sum();
        let mean = sum as f64 / samples.len() as f64;
        Some((mean * 100.0).round() / 100.0)
    };

    RatingSummary {
        count: samples.len(),
        average,
        distribution,
    }
}

/// One question inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSnapshot {
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub results: QuestionResults,
}

impl QuestionSnapshot {
    fn of(poll: &Poll, question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            kind: question.kind,
            options: question.options.clone(),
            results: QuestionResults::of(poll, question),
        }
    }
}

/// Full poll state handed to a joiner.
///
/// Admins and viewers receive the same fields; `role` only echoes how the
/// connection joined.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSnapshot {
    pub session_code: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub is_expired: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub questions: Vec<QuestionSnapshot>,
    pub total_participants: usize,
    pub total_responses: usize,
    pub role: Role,
    /// Aggregate revision the snapshot was read at. Updates at or below it
    /// are already reflected.
    pub revision: u64,
}

impl PollSnapshot {
    #[must_use]
    pub fn build(poll: &Poll, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            session_code: poll.session_code.to_string(),
            title: poll.title.clone(),
            is_active: poll.is_active,
            is_expired: poll.is_expired_at(now),
            expires_at: poll.expires_at,
            created_at: poll.created_at,
            closed_at: poll.closed_at,
            questions: poll
                .questions
                .iter()
                .map(|q| QuestionSnapshot::of(poll, q))
                .collect(),
            total_participants: poll.participant_count(),
            total_responses: poll.responses.len(),
            role,
            revision: poll.revision,
        }
    }
}

/// Row of an admin's poll list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub session_code: String,
    pub title: Option<String>,
    pub is_active: bool,
    pub is_expired: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub question_count: usize,
    pub total_participants: usize,
}

impl PollSummary {
    #[must_use]
    pub fn build(poll: &Poll, now: DateTime<Utc>) -> Self {
        Self {
            session_code: poll.session_code.to_string(),
            title: poll.title.clone(),
            is_active: poll.is_active,
            is_expired: poll.is_expired_at(now),
            expires_at: poll.expires_at,
            created_at: poll.created_at,
            question_count: poll.questions.len(),
            total_participants: poll.participant_count(),
        }
    }
}

/// Question-scoped update broadcast as `pollUpdate` after an accepted vote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDelta {
    pub question_id: String,
    pub tally: DeltaTally,
    pub total_participants: usize,
    pub timestamp: DateTime<Utc>,
    /// Aggregate revision the delta was taken from.
    pub revision: u64,
}

impl PollDelta {
    /// Delta for one question of a freshly committed aggregate.
    #[must_use]
    pub fn of(poll: &Poll, question: &Question, timestamp: DateTime<Utc>) -> Self {
        Self {
            question_id: question.id.clone(),
            tally: DeltaTally::of(poll, question),
            total_participants: poll.participant_count(),
            timestamp,
            revision: poll.revision,
        }
    }
}

/// A response as shown in the final state of a closed poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub participant_id: String,
    pub question_id: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<&Response> for ResponseView {
    fn from(response: &Response) -> Self {
        let value = match &response.value {
            VoteValue::Choice { label, .. } => json!(label),
            VoteValue::Rating(rating) => json!(rating),
            VoteValue::Text(text) => json!(text),
        };
        Self {
            participant_id: response.participant_id.clone(),
            question_id: response.question_id.clone(),
            value,
            timestamp: response.timestamp,
        }
    }
}

/// Final state broadcast as `pollClosed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollClosed {
    pub final_questions: Vec<QuestionSnapshot>,
    pub final_responses: Vec<ResponseView>,
    pub closed_at: DateTime<Utc>,
}

impl PollClosed {
    /// Final state of a poll. A poll deleted while still open reports `now`
    /// as its closing time.
    #[must_use]
    pub fn build(poll: &Poll, now: DateTime<Utc>) -> Self {
        Self {
            final_questions: poll
                .questions
                .iter()
                .map(|q| QuestionSnapshot::of(poll, q))
                .collect(),
            final_responses: poll.responses.iter().map(ResponseView::from).collect(),
            closed_at: poll.closed_at.unwrap_or(now),
        }
    }
}
