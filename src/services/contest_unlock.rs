use std::sync::Arc;

use thiserror::Error;

use crate::repositories::contest_progress::ContestProgressCache;
use crate::schemas::contest::{
    ContestEntryView, ContestExamRef, ContestParticipation, ContestProgressEntry,
};
use crate::schemas::submission::{ExamAttempt, StartOptions};
use crate::schemas::types::ContestExamStatus;
use crate::services::exam_session::{ExamSession, SessionError, SessionEvent};
use crate::services::remote::ContestBackend;

#[derive(Debug, Error)]
pub enum ContestError {
    #[error("exam {0} is locked")]
    Locked(String),
    #[error("exam {0} is already completed")]
    AlreadyCompleted(String),
    #[error("exam {0} is not part of this contest")]
    UnknownExam(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    /// Begin a new attempt; stale local progress must be dropped.
    StartFresh,
    Resume,
}

/// Local status only ever upgrades the server's view. `completed` always wins.
pub fn merge_status(
    server: ContestExamStatus,
    local: Option<ContestExamStatus>,
) -> ContestExamStatus {
    match local {
        Some(ContestExamStatus::Completed) => ContestExamStatus::Completed,
        Some(local) if local.rank() >= server.rank() => local,
        _ => server,
    }
}

/// Effective status per exam, in `order`.
///
/// A locked exam becomes ready once the exam before it is completed. Apart from that,
/// local state cannot turn a server-locked exam into `ready` or `ongoing`.
pub fn compute_effective(entries: &[ContestProgressEntry]) -> Vec<ContestEntryView> {
    let mut sorted: Vec<&ContestProgressEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.order);

    let mut views = Vec::with_capacity(sorted.len());
    let mut previous: Option<ContestExamStatus> = None;

    for entry in sorted {
        let unlocked_by_previous = previous == Some(ContestExamStatus::Completed);
        let mut status = merge_status(entry.server_status, entry.local_status);

        if entry.server_status == ContestExamStatus::Locked
            && matches!(status, ContestExamStatus::Ready | ContestExamStatus::Ongoing)
            && !unlocked_by_previous
        {
            status = ContestExamStatus::Locked;
        }
        if status == ContestExamStatus::Locked && unlocked_by_previous {
            status = ContestExamStatus::Ready;
        }

        views.push(ContestEntryView {
            exam_id: entry.exam_id.clone(),
            order: entry.order,
            status,
        });
        previous = Some(status);
    }

    views
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContestBoard {
    entries: Vec<ContestEntryView>,
}

impl ContestBoard {
    pub fn new(entries: Vec<ContestEntryView>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ContestEntryView] {
        &self.entries
    }

    pub fn status_of(&self, exam_id: &str) -> Option<ContestExamStatus> {
        self.entries.iter().find(|entry| entry.exam_id == exam_id).map(|entry| entry.status)
    }

    pub fn completed_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.status == ContestExamStatus::Completed).count()
    }

    /// Gates the results view.
    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.completed_count() == self.entries.len()
    }

    /// Completed share rounded half up to a whole percent.
    pub fn progress_percent(&self) -> u8 {
        let total = self.entries.len();
        if total == 0 {
            return 0;
        }
        let percent = (self.completed_count() * 200 + total) / (total * 2);
        u8::try_from(percent).unwrap_or(100)
    }

    /// First exam that can be started or resumed.
    pub fn current(&self) -> Option<&ContestEntryView> {
        self.entries.iter().find(|entry| {
            matches!(entry.status, ContestExamStatus::Ready | ContestExamStatus::Ongoing)
        })
    }

    pub fn start_action(&self, exam_id: &str) -> Result<StartAction, ContestError> {
        match self.status_of(exam_id) {
            Some(ContestExamStatus::Ready) => Ok(StartAction::StartFresh),
            Some(ContestExamStatus::Ongoing) => Ok(StartAction::Resume),
            Some(ContestExamStatus::Locked) => Err(ContestError::Locked(exam_id.to_string())),
            Some(ContestExamStatus::Completed) => {
                Err(ContestError::AlreadyCompleted(exam_id.to_string()))
            }
            None => Err(ContestError::UnknownExam(exam_id.to_string())),
        }
    }
}

/// Combines the server's participation record with locally observed progress.
pub struct ContestTracker {
    contest_id: String,
    exams: Vec<ContestExamRef>,
    backend: Arc<dyn ContestBackend>,
    cache: ContestProgressCache,
    server: Option<ContestParticipation>,
}

impl ContestTracker {
    pub fn new(
        contest_id: impl Into<String>,
        mut exams: Vec<ContestExamRef>,
        backend: Arc<dyn ContestBackend>,
        cache: ContestProgressCache,
    ) -> Self {
        exams.sort_by_key(|exam| exam.order);
        Self { contest_id: contest_id.into(), exams, backend, cache, server: None }
    }

    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    /// Refetches participation. On failure the last known server view is kept.
    pub async fn refresh(&mut self) -> ContestBoard {
        match self.backend.get_contest_participation(&self.contest_id).await {
            Ok(participation) => self.server = Some(participation),
            Err(err) => tracing::warn!(
                contest_id = %self.contest_id,
                error = %err,
                "Failed to refresh contest participation; keeping last known state"
            ),
        }
        self.board().await
    }

    pub async fn board(&self) -> ContestBoard {
        let local = self.cache.load(&self.contest_id).await;
        let entries: Vec<ContestProgressEntry> = self
            .exams
            .iter()
            .enumerate()
            .map(|(position, exam)| {
                let server_status = self
                    .server
                    .as_ref()
                    .and_then(|server| server.status_of(&exam.exam_id))
                    .unwrap_or(if position == 0 {
                        ContestExamStatus::Ready
                    } else {
                        ContestExamStatus::Locked
                    });
                ContestProgressEntry::new(
                    exam.exam_id.clone(),
                    exam.order,
                    server_status,
                    local.get(&exam.exam_id).copied(),
                )
            })
            .collect();
        ContestBoard::new(compute_effective(&entries))
    }

    /// Mirrors session lifecycle events into the local contest cache.
    pub async fn record_event(&self, event: &SessionEvent) {
        let (exam_id, contest_id, status) = match event {
            SessionEvent::Started { exam_id, contest_id, .. } => {
                (exam_id, contest_id, ContestExamStatus::Ongoing)
            }
            SessionEvent::Submitted { exam_id, contest_id, .. } => {
                (exam_id, contest_id, ContestExamStatus::Completed)
            }
        };
        if contest_id.as_deref() != Some(self.contest_id.as_str()) {
            return;
        }
        if !self.exams.iter().any(|exam| &exam.exam_id == exam_id) {
            tracing::warn!(
                contest_id = %self.contest_id,
                exam_id = %exam_id,
                "Event for exam outside contest"
            );
            return;
        }
        self.cache.mark(&self.contest_id, exam_id, status).await;
    }

    /// Starts or resumes the session's exam if the board allows it.
    pub async fn start_exam(&self, session: &ExamSession) -> Result<ExamAttempt, ContestError> {
        let exam_id = &session.definition().exam_id;
        let action = self.board().await.start_action(exam_id)?;
        let options = StartOptions::for_contest(self.contest_id.clone());

        let attempt = match action {
            StartAction::StartFresh => session.start_fresh(&options).await?,
            StartAction::Resume => session.resume_or_start(&options).await?,
        };
        self.cache.mark(&self.contest_id, exam_id, ContestExamStatus::Ongoing).await;
        Ok(attempt)
    }
}
