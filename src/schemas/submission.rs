use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::schemas::answer::AnswerRecord;
use crate::schemas::types::AttemptStatus;

/// Root aggregate of one attempt at one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamAttempt {
    pub exam_id: String,
    pub submission_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub duration_seconds: u32,
    pub status: AttemptStatus,
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub contest_id: Option<String>,
}

impl ExamAttempt {
    pub fn not_started(exam_id: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            exam_id: exam_id.into(),
            submission_id: None,
            started_at: None,
            duration_seconds,
            status: AttemptStatus::NotStarted,
            assignment_id: None,
            contest_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub contest_id: Option<String>,
}

impl StartOptions {
    pub fn for_contest(contest_id: impl Into<String>) -> Self {
        Self { assignment_id: None, contest_id: Some(contest_id.into()) }
    }
}

/// Whole-attempt snapshot mirrored into the local progress store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSnapshot {
    pub exam_id: String,
    pub submission_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_seconds: u32,
    pub status: AttemptStatus,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub contest_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSubmission {
    pub submission_id: String,
}

/// In-progress submission as reported by the server on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubmission {
    pub submission_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedSubmission {
    pub submission_id: String,
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub max_score: f64,
    pub answer_count: usize,
    #[serde(default)]
    pub time_spent_seconds: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}
