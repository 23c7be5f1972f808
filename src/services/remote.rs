use async_trait::async_trait;
use thiserror::Error;

use crate::schemas::answer::AnswerRecord;
use crate::schemas::contest::ContestParticipation;
use crate::schemas::submission::{ActiveSubmission, CreatedSubmission, FinalizedSubmission};

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("remote backend is not configured")]
    NotConfigured,
}

impl BackendError {
    /// Transport failures and 5xx/429 responses are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            BackendError::Decode(_) | BackendError::NotConfigured => false,
        }
    }
}

/// Server side of an exam attempt. Pushes and submits must be idempotent on the server.
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    async fn create_submission(
        &self,
        exam_id: &str,
        assignment_id: Option<&str>,
        contest_id: Option<&str>,
    ) -> Result<CreatedSubmission, BackendError>;

    async fn push_answers(
        &self,
        submission_id: &str,
        answers: &[AnswerRecord],
    ) -> Result<(), BackendError>;

    async fn submit_exam(
        &self,
        submission_id: &str,
        answers: &[AnswerRecord],
        time_spent_seconds: u64,
    ) -> Result<FinalizedSubmission, BackendError>;

    async fn get_active_submission(
        &self,
        exam_id: &str,
    ) -> Result<Option<ActiveSubmission>, BackendError>;
}

#[async_trait]
pub trait ContestBackend: Send + Sync {
    async fn get_contest_participation(
        &self,
        contest_id: &str,
    ) -> Result<ContestParticipation, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::BackendError;

    #[test]
    fn transient_classification() {
        assert!(BackendError::Transport("reset".to_string()).is_transient());
        assert!(BackendError::Status { status: 503, body: String::new() }.is_transient());
        assert!(BackendError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!BackendError::Status { status: 409, body: String::new() }.is_transient());
        assert!(!BackendError::NotConfigured.is_transient());
    }
}
