use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Notify};

use crate::core::config::Settings;
use crate::core::time::Clock;
use crate::repositories::progress::LocalProgressStore;
use crate::schemas::answer::{AnswerRecord, AnswerValue};
use crate::schemas::exam::{ExamDefinition, QuestionRef};
use crate::schemas::submission::{
    ActiveSubmission, AttemptSnapshot, ExamAttempt, FinalizedSubmission, StartOptions,
};
use crate::schemas::types::{AttemptStatus, SubmitTrigger};
use crate::services::answer_ledger::{merge_last_write_wins, AnswerLedger};
use crate::services::autosave::{AutosaveScheduler, PushOutcome, PushStart, SyncState};
use crate::services::exam_layout::{
    self, NavigationStatus, QuestionLayout, SectionGroup, SubmitStats,
};
use crate::services::exam_timer::ExamTimer;
use crate::services::remote::{BackendError, SubmissionBackend};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub autosave_debounce: Duration,
    pub autosave_interval: Duration,
    pub final_flush_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_millis(1500),
            autosave_interval: Duration::from_secs(30),
            final_flush_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            autosave_debounce: Duration::from_millis(settings.autosave().debounce_ms),
            autosave_interval: Duration::from_secs(settings.autosave().interval_seconds),
            final_flush_timeout: Duration::from_secs(
                settings.autosave().final_flush_timeout_seconds,
            ),
            tick_interval: Duration::from_millis(settings.timer().tick_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started {
        exam_id: String,
        submission_id: String,
        contest_id: Option<String>,
        resumed: bool,
    },
    /// Terminal transition. Consumed by the contest tracker.
    Submitted {
        exam_id: String,
        contest_id: Option<String>,
        submission: FinalizedSubmission,
        trigger: SubmitTrigger,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid exam definition: {0}")]
    InvalidDefinition(String),
    #[error("attempt is {actual}, expected {expected}")]
    InvalidState { actual: AttemptStatus, expected: AttemptStatus },
    #[error("attempt is already being started")]
    AlreadyStarting,
    #[error("unknown question {0}")]
    UnknownQuestion(String),
    #[error("failed to create submission: {0}")]
    CreateSubmission(#[source] BackendError),
    #[error("nothing to resume for exam {0}")]
    NothingToResume(String),
    #[error("failed to finalize submission: {0}")]
    Finalize(#[source] BackendError),
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Finalize(_) => true,
            SessionError::CreateSubmission(err) => err.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Finalized(FinalizedSubmission),
    AlreadySubmitted(FinalizedSubmission),
    /// Another caller holds the finalize guard.
    AlreadySubmitting,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub remaining_seconds: Option<u64>,
    pub forced_submit: bool,
    pub push: Option<PushOutcome>,
    pub status: AttemptStatus,
}

/// What an attempt is (re)activated from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActivationPlan {
    pub(crate) submission_id: String,
    pub(crate) started_at: OffsetDateTime,
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) unsynced: BTreeSet<String>,
    pub(crate) cursor: usize,
    pub(crate) assignment_id: Option<String>,
    pub(crate) contest_id: Option<String>,
}

/// Decides how to resume from a local snapshot and the server's active submission.
pub(crate) fn plan_resume(
    local: Option<AttemptSnapshot>,
    server: Option<ActiveSubmission>,
    options: &StartOptions,
) -> Option<ActivationPlan> {
    let plan = match (local, server) {
        (Some(local), Some(server)) if local.submission_id == server.submission_id => {
            let merged = merge_last_write_wins(server.answers, local.answers);
            ActivationPlan {
                submission_id: server.submission_id,
                started_at: server.started_at,
                answers: merged.records,
                unsynced: merged.local_wins,
                cursor: local.cursor,
                assignment_id: options.assignment_id.clone().or(local.assignment_id),
                contest_id: options.contest_id.clone().or(local.contest_id),
            }
        }
        (local, Some(server)) => {
            if let Some(local) = local {
                tracing::warn!(
                    exam_id = %local.exam_id,
                    local_submission_id = %local.submission_id,
                    server_submission_id = %server.submission_id,
                    "Local progress belongs to another submission; using server record"
                );
            }
            ActivationPlan {
                submission_id: server.submission_id,
                started_at: server.started_at,
                answers: server.answers,
                unsynced: BTreeSet::new(),
                cursor: 0,
                assignment_id: options.assignment_id.clone(),
                contest_id: options.contest_id.clone(),
            }
        }
        (Some(local), None) => ActivationPlan {
            unsynced: local.answers.iter().map(|record| record.question_id.clone()).collect(),
            submission_id: local.submission_id,
            started_at: local.started_at,
            answers: local.answers,
            cursor: local.cursor,
            assignment_id: options.assignment_id.clone().or(local.assignment_id),
            contest_id: options.contest_id.clone().or(local.contest_id),
        },
        (None, None) => return None,
    };
    Some(plan)
}

struct SessionState {
    attempt: ExamAttempt,
    cursor: usize,
    ledger: AnswerLedger,
    sync: SyncState,
    scheduler: AutosaveScheduler,
    timer: Option<ExamTimer>,
    starting: bool,
    finalizing: bool,
    stale: bool,
    finalized: Option<FinalizedSubmission>,
}

struct SessionInner {
    definition: ExamDefinition,
    backend: Arc<dyn SubmissionBackend>,
    store: LocalProgressStore,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    push_done: Notify,
    events: broadcast::Sender<SessionEvent>,
}

/// One attempt at one exam. Cheap to clone; clones share the same attempt.
///
/// State lives behind a synchronous mutex that is never held across an await, so
/// backend calls always run unlocked. Pushes are serialized through `SyncState`, and
/// finalize through the `in-progress -> submitting` transition plus a guard flag.
#[derive(Clone)]
pub struct ExamSession {
    inner: Arc<SessionInner>,
}

impl ExamSession {
    pub fn new(
        definition: ExamDefinition,
        backend: Arc<dyn SubmissionBackend>,
        store: LocalProgressStore,
        clock: Arc<dyn Clock>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let definition = definition.prepared().map_err(SessionError::InvalidDefinition)?;
        let now = clock.now();
        let state = SessionState {
            attempt: ExamAttempt::not_started(&definition.exam_id, definition.duration_seconds),
            cursor: 0,
            ledger: AnswerLedger::new(),
            sync: SyncState::default(),
            scheduler: AutosaveScheduler::new(
                options.autosave_debounce,
                options.autosave_interval,
                now,
            ),
            timer: None,
            starting: false,
            finalizing: false,
            stale: false,
            finalized: None,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(SessionInner {
                definition,
                backend,
                store,
                clock,
                options,
                state: Mutex::new(state),
                push_done: Notify::new(),
                events,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exam_id(&self) -> &str {
        &self.inner.definition.exam_id
    }

    fn begin_start(&self) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.attempt.status != AttemptStatus::NotStarted {
            return Err(SessionError::InvalidState {
                actual: state.attempt.status,
                expected: AttemptStatus::NotStarted,
            });
        }
        if state.starting {
            return Err(SessionError::AlreadyStarting);
        }
        state.starting = true;
        Ok(())
    }

    fn abort_start(&self) {
        self.lock().starting = false;
    }

    /// Creates a new submission and anchors the timer at the current instant.
    /// Any stale local progress for this exam is dropped first.
    pub async fn start_fresh(&self, options: &StartOptions) -> Result<ExamAttempt, SessionError> {
        self.begin_start()?;
        self.inner.store.clear(self.exam_id()).await;

        let created = match self
            .inner
            .backend
            .create_submission(
                self.exam_id(),
                options.assignment_id.as_deref(),
                options.contest_id.as_deref(),
            )
            .await
        {
            Ok(created) => created,
            Err(err) => {
                self.abort_start();
                tracing::warn!(
                    exam_id = %self.exam_id(),
                    error = %err,
                    "Failed to create submission"
                );
                return Err(SessionError::CreateSubmission(err));
            }
        };

        let plan = ActivationPlan {
            submission_id: created.submission_id,
            started_at: self.inner.clock.now(),
            answers: Vec::new(),
            unsynced: BTreeSet::new(),
            cursor: 0,
            assignment_id: options.assignment_id.clone(),
            contest_id: options.contest_id.clone(),
        };
        Ok(self.activate(plan, false).await)
    }

    /// Rebuilds the attempt from local progress and/or the server's active submission.
    /// A snapshot left in `submitting` by a failed finalize is resumed as `in-progress`;
    /// if its time is already up the first tick submits it again.
    pub async fn resume(&self, options: &StartOptions) -> Result<ExamAttempt, SessionError> {
        self.begin_start()?;

        let local = self
            .inner
            .store
            .load(self.exam_id())
            .await
            .filter(|snapshot| {
                matches!(snapshot.status, AttemptStatus::InProgress | AttemptStatus::Submitting)
            });
        let interrupted_submit =
            local.as_ref().filter(|snapshot| snapshot.status == AttemptStatus::Submitting);
        if let Some(snapshot) = interrupted_submit {
            tracing::info!(
                exam_id = %self.exam_id(),
                submission_id = %snapshot.submission_id,
                "Resuming an attempt whose finalize did not complete"
            );
        }
        let server = match self.inner.backend.get_active_submission(self.exam_id()).await {
            Ok(server) => server,
            Err(err) => {
                tracing::warn!(
                    exam_id = %self.exam_id(),
                    error = %err,
                    "Failed to fetch active submission; resuming from local progress only"
                );
                None
            }
        };

        let Some(plan) = plan_resume(local, server, options) else {
            self.abort_start();
            return Err(SessionError::NothingToResume(self.exam_id().to_string()));
        };
        Ok(self.activate(plan, true).await)
    }

    pub async fn resume_or_start(
        &self,
        options: &StartOptions,
    ) -> Result<ExamAttempt, SessionError> {
        match self.resume(options).await {
            Err(SessionError::NothingToResume(_)) => self.start_fresh(options).await,
            other => other,
        }
    }

    async fn activate(&self, plan: ActivationPlan, resumed: bool) -> ExamAttempt {
        let definition = &self.inner.definition;
        let now = self.inner.clock.now();

        let attempt = {
            let mut state = self.lock();
            let answers = plan
                .answers
                .into_iter()
                .filter(|record| definition.contains_question(&record.question_id))
                .collect();
            state.ledger.hydrate(answers);

            state.sync = SyncState::default();
            for question_id in &plan.unsynced {
                if state.ledger.get(question_id).is_some() {
                    state.sync.mark_pending(question_id);
                }
            }

            state.scheduler = AutosaveScheduler::new(
                self.inner.options.autosave_debounce,
                self.inner.options.autosave_interval,
                now,
            );
            if state.sync.has_pending() {
                state.scheduler.request_immediate();
            }

            state.attempt = ExamAttempt {
                exam_id: definition.exam_id.clone(),
                submission_id: Some(plan.submission_id),
                started_at: Some(plan.started_at),
                duration_seconds: definition.duration_seconds,
                status: AttemptStatus::InProgress,
                assignment_id: plan.assignment_id,
                contest_id: plan.contest_id,
            };
            state.cursor = plan.cursor.min(definition.questions.len().saturating_sub(1));
            state.timer = Some(ExamTimer::new(plan.started_at, definition.duration_seconds));
            state.starting = false;
            state.finalizing = false;
            state.finalized = None;
            state.stale = true;
            state.attempt.clone()
        };

        let submission_id = attempt.submission_id.clone().unwrap_or_default();
        tracing::info!(
            exam_id = %attempt.exam_id,
            submission_id = %submission_id,
            resumed,
            "Exam attempt started"
        );
        self.persist().await;

        let _ = self.inner.events.send(SessionEvent::Started {
            exam_id: attempt.exam_id.clone(),
            submission_id,
            contest_id: attempt.contest_id.clone(),
            resumed,
        });
        attempt
    }

    pub fn go_to_next(&self) -> usize {
        self.navigate(|cursor, _| cursor.checked_add(1))
    }

    pub fn go_to_previous(&self) -> usize {
        self.navigate(|cursor, _| cursor.checked_sub(1))
    }

    pub fn go_to_question(&self, index: usize) -> usize {
        self.navigate(|_, _| Some(index))
    }

    /// Moves the cursor if the target is in bounds and flushes pending answers in the
    /// background. Returns the resulting cursor.
    fn navigate<F>(&self, target: F) -> usize
    where
        F: FnOnce(usize, usize) -> Option<usize>,
    {
        let total = self.inner.definition.questions.len();
        let (cursor, flush) = {
            let mut state = self.lock();
            let next = target(state.cursor, total).filter(|index| *index < total);
            match next {
                Some(index) if index != state.cursor => {
                    state.cursor = index;
                    state.stale = true;
                    state.scheduler.request_immediate();
                    let flush = state.attempt.status == AttemptStatus::InProgress
                        && state.sync.has_pending();
                    (index, flush)
                }
                _ => (state.cursor, false),
            }
        };

        if flush {
            self.spawn_flush();
        }
        cursor
    }

    fn spawn_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let session = self.clone();
        handle.spawn(async move {
            let outcome = session.push_pending().await;
            tracing::debug!(exam_id = %session.exam_id(), ?outcome, "Navigation flush finished");
        });
    }

    fn ensure_editable(&self, state: &SessionState, question_id: &str) -> Result<(), SessionError> {
        if state.attempt.status != AttemptStatus::InProgress {
            return Err(SessionError::InvalidState {
                actual: state.attempt.status,
                expected: AttemptStatus::InProgress,
            });
        }
        if !self.inner.definition.contains_question(question_id) {
            return Err(SessionError::UnknownQuestion(question_id.to_string()));
        }
        Ok(())
    }

    pub fn update_answer(&self, question_id: &str, value: AnswerValue) -> Result<(), SessionError> {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        self.ensure_editable(&state, question_id)?;

        state.ledger.set_answer(question_id, value, now);
        state.sync.mark_pending(question_id);
        state.scheduler.note_mutation(now);
        state.stale = true;
        Ok(())
    }

    /// Flags are synced like answers. Returns the new flag state.
    pub fn toggle_flag(&self, question_id: &str) -> Result<bool, SessionError> {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        self.ensure_editable(&state, question_id)?;

        let flagged = state.ledger.toggle_flag(question_id, now);
        state.sync.mark_pending(question_id);
        state.scheduler.note_mutation(now);
        state.stale = true;
        Ok(flagged)
    }

    /// Pushes the pending set once. Never fails; the outcome says what happened.
    pub async fn push_pending(&self) -> PushOutcome {
        let (submission_id, batch) = {
            let mut state = self.lock();
            let status = state.attempt.status;
            if !matches!(status, AttemptStatus::InProgress | AttemptStatus::Submitting) {
                return PushOutcome::Idle;
            }
            let Some(submission_id) = state.attempt.submission_id.clone() else {
                return PushOutcome::Idle;
            };
            let state = &mut *state;
            match state.sync.begin_push(&state.ledger) {
                PushStart::Idle => return PushOutcome::Idle,
                PushStart::Deferred => {
                    crate::core::metrics::record_autosave_push("deferred");
                    return PushOutcome::Deferred;
                }
                PushStart::Ready(batch) => (submission_id, batch),
            }
        };

        let result = self
            .inner
            .backend
            .push_answers(&submission_id, &batch.records)
            .await
            .map_err(|err| err.to_string());

        let outcome = {
            let mut state = self.lock();
            let now = self.inner.clock.now();
            let state = &mut *state;
            let outcome = state.sync.complete_push(&batch, &state.ledger, result, now);
            state.scheduler.mark_pushed(now);
            if state.sync.take_deferred() && state.sync.has_pending() {
                state.scheduler.request_immediate();
            }
            outcome
        };
        self.inner.push_done.notify_waiters();

        crate::core::metrics::record_autosave_push(outcome.metric_label());
        match &outcome {
            PushOutcome::Pushed { confirmed, still_pending } => tracing::debug!(
                exam_id = %self.exam_id(),
                submission_id = %submission_id,
                confirmed,
                still_pending,
                "Autosave push completed"
            ),
            PushOutcome::Failed { error } => tracing::warn!(
                exam_id = %self.exam_id(),
                submission_id = %submission_id,
                error = %error,
                "Autosave push failed; will retry on the next tick"
            ),
            PushOutcome::Idle | PushOutcome::Deferred => {}
        }
        outcome
    }

    /// Pushes until nothing is pending, waiting out any push already in flight.
    async fn flush_pending(&self) {
        loop {
            let notified = self.inner.push_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.push_pending().await {
                PushOutcome::Deferred => notified.await,
                PushOutcome::Pushed { still_pending, .. } if still_pending > 0 => continue,
                _ => break,
            }
        }
    }

    /// Moves the attempt to `submitted`. The final flush is bounded by the configured
    /// timeout; finalize then runs with the whole ledger regardless of its result.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SubmitOutcome, SessionError> {
        let (submission_id, time_spent_seconds) = {
            let mut state = self.lock();
            match state.attempt.status {
                AttemptStatus::Submitted => {
                    if let Some(finalized) = state.finalized.clone() {
                        return Ok(SubmitOutcome::AlreadySubmitted(finalized));
                    }
                    return Ok(SubmitOutcome::AlreadySubmitting);
                }
                AttemptStatus::Submitting if state.finalizing => {
                    return Ok(SubmitOutcome::AlreadySubmitting);
                }
                AttemptStatus::InProgress | AttemptStatus::Submitting => {}
                AttemptStatus::NotStarted => {
                    return Err(SessionError::InvalidState {
                        actual: AttemptStatus::NotStarted,
                        expected: AttemptStatus::InProgress,
                    });
                }
            }

            let Some(submission_id) = state.attempt.submission_id.clone() else {
                return Err(SessionError::InvalidState {
                    actual: state.attempt.status,
                    expected: AttemptStatus::InProgress,
                });
            };
            state.attempt.status = AttemptStatus::Submitting;
            state.finalizing = true;
            state.stale = true;
            let now = self.inner.clock.now();
            let spent = state.timer.as_ref().map_or(0, |timer| timer.time_spent_seconds(now));
            (submission_id, spent)
        };

        tracing::info!(
            exam_id = %self.exam_id(),
            submission_id = %submission_id,
            trigger = trigger.as_str(),
            "Submitting exam"
        );

        // The flush runs as its own task so a timeout never cancels a push mid-flight.
        let flush = {
            let session = self.clone();
            tokio::spawn(async move { session.flush_pending().await })
        };
        match tokio::time::timeout(self.inner.options.final_flush_timeout, flush).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(
                exam_id = %self.exam_id(),
                error = %err,
                "Final autosave flush task failed"
            ),
            Err(_) => tracing::warn!(
                exam_id = %self.exam_id(),
                submission_id = %submission_id,
                "Final autosave flush timed out; finalizing with the local ledger"
            ),
        }

        let answers = self.lock().ledger.snapshot();
        let result = self
            .inner
            .backend
            .submit_exam(&submission_id, &answers, time_spent_seconds)
            .await;

        match result {
            Ok(finalized) => {
                let contest_id = {
                    let mut state = self.lock();
                    state.attempt.status = AttemptStatus::Submitted;
                    state.finalizing = false;
                    state.stale = false;
                    state.finalized = Some(finalized.clone());
                    if let Some(timer) = state.timer.as_mut() {
                        timer.stop();
                    }
                    state.attempt.contest_id.clone()
                };
                self.inner.store.clear(self.exam_id()).await;

                crate::core::metrics::record_finalize("ok", trigger.as_str());
                tracing::info!(
                    exam_id = %self.exam_id(),
                    submission_id = %submission_id,
                    answer_count = finalized.answer_count,
                    "Exam submitted"
                );
                let _ = self.inner.events.send(SessionEvent::Submitted {
                    exam_id: self.exam_id().to_string(),
                    contest_id,
                    submission: finalized.clone(),
                    trigger,
                });
                Ok(SubmitOutcome::Finalized(finalized))
            }
            Err(err) => {
                {
                    let mut state = self.lock();
                    state.finalizing = false;
                    let now = self.inner.clock.now();
                    state.scheduler.mark_pushed(now);
                }
                crate::core::metrics::record_finalize("error", trigger.as_str());
                tracing::error!(
                    exam_id = %self.exam_id(),
                    submission_id = %submission_id,
                    error = %err,
                    "Failed to finalize submission"
                );
                Err(SessionError::Finalize(err))
            }
        }
    }

    /// One driver step: observe the timer, force submit on expiry, push when autosave is
    /// due and save a stale snapshot.
    pub async fn tick(&self) -> TickReport {
        let now = self.inner.clock.now();
        let (reading, status, push_due, retry_finalize) = {
            let mut state = self.lock();
            let reading = state.timer.as_mut().map(|timer| timer.observe(now));
            let status = state.attempt.status;
            let push_due = status == AttemptStatus::InProgress
                && state.scheduler.is_due(now, state.sync.has_pending());
            let retry_finalize = status == AttemptStatus::Submitting
                && !state.finalizing
                && reading.is_some_and(|reading| reading.expired)
                && state.scheduler.is_due(now, true);
            (reading, status, push_due, retry_finalize)
        };

        let mut report = TickReport {
            remaining_seconds: reading.map(|reading| reading.remaining_seconds),
            forced_submit: false,
            push: None,
            status,
        };

        let expiry_edge = reading.is_some_and(|reading| reading.expiry_edge);
        if expiry_edge || retry_finalize {
            tracing::info!(exam_id = %self.exam_id(), "Time is up; forcing submission");
            match self.submit(SubmitTrigger::TimerExpired).await {
                Ok(SubmitOutcome::Finalized(_)) => report.forced_submit = true,
                Ok(_) => {
                    tracing::debug!(exam_id = %self.exam_id(), "Submission already handled")
                }
                Err(err) => {
                    report.forced_submit = true;
                    tracing::warn!(
                        exam_id = %self.exam_id(),
                        error = %err,
                        "Forced submission failed"
                    );
                }
            }
        } else if push_due {
            report.push = Some(self.push_pending().await);
        }

        self.persist_if_stale().await;
        report.status = self.status();
        report
    }

    fn snapshot(&self, state: &SessionState) -> Option<AttemptSnapshot> {
        if !matches!(state.attempt.status, AttemptStatus::InProgress | AttemptStatus::Submitting) {
            return None;
        }
        Some(AttemptSnapshot {
            exam_id: state.attempt.exam_id.clone(),
            submission_id: state.attempt.submission_id.clone()?,
            started_at: state.attempt.started_at?,
            duration_seconds: state.attempt.duration_seconds,
            status: state.attempt.status,
            answers: state.ledger.snapshot(),
            cursor: state.cursor,
            assignment_id: state.attempt.assignment_id.clone(),
            contest_id: state.attempt.contest_id.clone(),
            saved_at: self.inner.clock.now(),
        })
    }

    /// Writes the current snapshot to the local progress store.
    pub async fn persist(&self) {
        let snapshot = {
            let mut state = self.lock();
            state.stale = false;
            self.snapshot(&state)
        };
        if let Some(snapshot) = snapshot {
            self.inner.store.save(self.exam_id(), &snapshot).await;
        }
    }

    pub async fn persist_if_stale(&self) {
        if self.lock().stale {
            self.persist().await;
        }
    }

    pub fn definition(&self) -> &ExamDefinition {
        &self.inner.definition
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> AttemptStatus {
        self.lock().attempt.status
    }

    pub fn attempt(&self) -> ExamAttempt {
        self.lock().attempt.clone()
    }

    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn current_question(&self) -> Option<QuestionRef> {
        let cursor = self.cursor();
        self.inner.definition.questions.get(cursor).cloned()
    }

    pub fn time_remaining(&self) -> Option<u64> {
        let now = self.inner.clock.now();
        self.lock().timer.as_ref().map(|timer| timer.peek(now))
    }

    pub fn sync_state(&self) -> SyncState {
        self.lock().sync.clone()
    }

    pub fn answer(&self, question_id: &str) -> Option<AnswerRecord> {
        self.lock().ledger.get(question_id).cloned()
    }

    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.lock().ledger.snapshot()
    }

    pub fn finalized(&self) -> Option<FinalizedSubmission> {
        self.lock().finalized.clone()
    }

    pub fn layout(&self) -> QuestionLayout {
        exam_layout::layout_for(&self.inner.definition, self.cursor())
    }

    pub fn section_overview(&self) -> Vec<SectionGroup> {
        let state = self.lock();
        exam_layout::section_overview(&self.inner.definition, &state.ledger, state.cursor)
    }

    pub fn submit_stats(&self) -> SubmitStats {
        exam_layout::submit_stats(&self.inner.definition, &self.lock().ledger)
    }

    pub fn navigation_status(&self) -> NavigationStatus {
        exam_layout::navigation_status(&self.inner.definition, self.cursor())
    }
}
