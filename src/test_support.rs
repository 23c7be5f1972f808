use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::time::{Clock, ManualClock};
use crate::repositories::progress::LocalProgressStore;
use crate::schemas::answer::AnswerRecord;
use crate::schemas::contest::ContestParticipation;
use crate::schemas::exam::{ExamDefinition, QuestionRef, ReadingPassage};
use crate::schemas::submission::{ActiveSubmission, CreatedSubmission, FinalizedSubmission};
use crate::services::exam_session::{ExamSession, SessionOptions};
use crate::services::remote::{BackendError, ContestBackend, SubmissionBackend};

pub(crate) const EXAM_ID: &str = "exam-1";
pub(crate) const T0: OffsetDateTime = datetime!(2025-03-01 08:00:00 UTC);

#[derive(Debug, Clone)]
pub(crate) struct SubmitCall {
    pub(crate) submission_id: String,
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) time_spent_seconds: u64,
}

#[derive(Default)]
struct FakeState {
    created: Vec<String>,
    fail_create: bool,
    pushes: Vec<Vec<AnswerRecord>>,
    failing_push_ids: BTreeSet<String>,
    push_delay: Option<Duration>,
    submits: Vec<SubmitCall>,
    failing_submits: usize,
    submit_delay: Option<Duration>,
    finalized: HashMap<String, FinalizedSubmission>,
    active: Option<ActiveSubmission>,
    active_error: bool,
    participation: HashMap<String, ContestParticipation>,
    participation_error: bool,
}

/// In-memory stand-in for the submission and contest endpoints.
#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.with_state(|state| state.fail_create = fail);
    }

    /// Any push carrying one of these questions fails as a whole.
    pub(crate) fn fail_pushes_containing(&self, question_id: &str) {
        self.with_state(|state| state.failing_push_ids.insert(question_id.to_string()));
    }

    pub(crate) fn set_push_delay(&self, delay: Duration) {
        self.with_state(|state| state.push_delay = Some(delay));
    }

    pub(crate) fn fail_next_submits(&self, count: usize) {
        self.with_state(|state| state.failing_submits = count);
    }

    pub(crate) fn set_submit_delay(&self, delay: Duration) {
        self.with_state(|state| state.submit_delay = Some(delay));
    }

    pub(crate) fn set_active(&self, active: Option<ActiveSubmission>) {
        self.with_state(|state| state.active = active);
    }

    pub(crate) fn fail_active_lookup(&self, fail: bool) {
        self.with_state(|state| state.active_error = fail);
    }

    pub(crate) fn set_participation(&self, contest_id: &str, participation: ContestParticipation) {
        self.with_state(|state| {
            state.participation.insert(contest_id.to_string(), participation);
        });
    }

    pub(crate) fn fail_participation(&self, fail: bool) {
        self.with_state(|state| state.participation_error = fail);
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.with_state(|state| state.created.clone())
    }

    pub(crate) fn pushes(&self) -> Vec<Vec<AnswerRecord>> {
        self.with_state(|state| state.pushes.clone())
    }

    pub(crate) fn submits(&self) -> Vec<SubmitCall> {
        self.with_state(|state| state.submits.clone())
    }

    /// Distinct submissions the server actually finalized.
    pub(crate) fn finalized_count(&self) -> usize {
        self.with_state(|state| state.finalized.len())
    }
}

#[async_trait]
impl SubmissionBackend for FakeBackend {
    async fn create_submission(
        &self,
        _exam_id: &str,
        _assignment_id: Option<&str>,
        _contest_id: Option<&str>,
    ) -> Result<CreatedSubmission, BackendError> {
        self.with_state(|state| {
            if state.fail_create {
                return Err(BackendError::Transport("connection refused".to_string()));
            }
            let submission_id = format!("sub-{}", Uuid::new_v4().simple());
            state.created.push(submission_id.clone());
            Ok(CreatedSubmission { submission_id })
        })
    }

    async fn push_answers(
        &self,
        _submission_id: &str,
        answers: &[AnswerRecord],
    ) -> Result<(), BackendError> {
        if let Some(delay) = self.with_state(|state| state.push_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|state| {
            state.pushes.push(answers.to_vec());
            let rejected =
                answers.iter().any(|record| state.failing_push_ids.contains(&record.question_id));
            if rejected {
                return Err(BackendError::Status { status: 503, body: "unavailable".to_string() });
            }
            Ok(())
        })
    }

    async fn submit_exam(
        &self,
        submission_id: &str,
        answers: &[AnswerRecord],
        time_spent_seconds: u64,
    ) -> Result<FinalizedSubmission, BackendError> {
        if let Some(delay) = self.with_state(|state| state.submit_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|state| {
            state.submits.push(SubmitCall {
                submission_id: submission_id.to_string(),
                answers: answers.to_vec(),
                time_spent_seconds,
            });
            if state.failing_submits > 0 {
                state.failing_submits -= 1;
                return Err(BackendError::Transport("connection reset".to_string()));
            }
            let finalized = state
                .finalized
                .entry(submission_id.to_string())
                .or_insert_with(|| FinalizedSubmission {
                    submission_id: submission_id.to_string(),
                    total_score: 0.0,
                    max_score: 3.0,
                    answer_count: answers.len(),
                    time_spent_seconds,
                    submitted_at: T0,
                })
                .clone();
            Ok(finalized)
        })
    }

    async fn get_active_submission(
        &self,
        _exam_id: &str,
    ) -> Result<Option<ActiveSubmission>, BackendError> {
        self.with_state(|state| {
            if state.active_error {
                return Err(BackendError::Status { status: 502, body: String::new() });
            }
            Ok(state.active.clone())
        })
    }
}

#[async_trait]
impl ContestBackend for FakeBackend {
    async fn get_contest_participation(
        &self,
        contest_id: &str,
    ) -> Result<ContestParticipation, BackendError> {
        self.with_state(|state| {
            if state.participation_error {
                return Err(BackendError::Transport("timeout".to_string()));
            }
            Ok(state.participation.get(contest_id).cloned().unwrap_or_default())
        })
    }
}

fn question(id: &str, order: u32, section: Option<&str>, passage: Option<&str>) -> QuestionRef {
    QuestionRef {
        question_id: id.to_string(),
        order,
        section: section.map(str::to_string),
        max_score: 1.0,
        linked_passage_id: passage.map(str::to_string),
    }
}

/// Three questions over 600 seconds; q2 and q3 share a reading passage.
pub(crate) fn definition() -> ExamDefinition {
    ExamDefinition {
        exam_id: EXAM_ID.to_string(),
        title: "Mock exam".to_string(),
        subject: "English".to_string(),
        duration_seconds: 600,
        questions: vec![
            question("q1", 1, None, None),
            question("q2", 2, Some("Reading"), Some("p1")),
            question("q3", 3, Some("Reading"), Some("p1")),
        ],
        passages: vec![ReadingPassage {
            id: "p1".to_string(),
            title: "The Lighthouse".to_string(),
            audio_url: None,
        }],
    }
}

pub(crate) fn clock() -> ManualClock {
    ManualClock::new(T0)
}

pub(crate) fn session(
    backend: &Arc<FakeBackend>,
    store: &LocalProgressStore,
    clock: &ManualClock,
) -> ExamSession {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    ExamSession::new(definition(), backend.clone(), store.clone(), clock, SessionOptions::default())
        .expect("valid definition")
}
