use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::schemas::answer::AnswerRecord;
use crate::services::answer_ledger::AnswerLedger;

/// Sync bookkeeping for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pending_question_ids: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    last_synced_at: Option<OffsetDateTime>,
    last_sync_error: Option<String>,
    in_flight: bool,
    deferred: bool,
}

/// Records captured at push start, with the revision each one had.
#[derive(Debug, Clone, PartialEq)]
pub struct PushBatch {
    pub records: Vec<AnswerRecord>,
    pub revisions: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushStart {
    Idle,
    /// Another push is in flight; this one runs on a later tick.
    Deferred,
    Ready(PushBatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Idle,
    Deferred,
    Pushed { confirmed: usize, still_pending: usize },
    Failed { error: String },
}

impl PushOutcome {
    pub fn metric_label(&self) -> &'static str {
        match self {
            PushOutcome::Idle => "idle",
            PushOutcome::Deferred => "deferred",
            PushOutcome::Pushed { .. } => "ok",
            PushOutcome::Failed { .. } => "error",
        }
    }
}

impl SyncState {
    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending_question_ids
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_question_ids.is_empty()
    }

    pub fn is_pending(&self, question_id: &str) -> bool {
        self.pending_question_ids.contains(question_id)
    }

    pub fn last_synced_at(&self) -> Option<OffsetDateTime> {
        self.last_synced_at
    }

    pub fn last_sync_error(&self) -> Option<&str> {
        self.last_sync_error.as_deref()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn mark_pending(&mut self, question_id: &str) {
        self.pending_question_ids.insert(question_id.to_string());
    }

    /// Returns whether a push was deferred since the last call, clearing the flag.
    pub fn take_deferred(&mut self) -> bool {
        std::mem::take(&mut self.deferred)
    }

    pub fn begin_push(&mut self, ledger: &AnswerLedger) -> PushStart {
        if self.in_flight {
            self.deferred = true;
            return PushStart::Deferred;
        }

        self.pending_question_ids.retain(|question_id| ledger.revision(question_id).is_some());
        let captured = ledger.records_for(self.pending_question_ids.iter());
        if captured.is_empty() {
            self.pending_question_ids.clear();
            return PushStart::Idle;
        }

        self.in_flight = true;
        let mut records = Vec::with_capacity(captured.len());
        let mut revisions = BTreeMap::new();
        for (record, revision) in captured {
            revisions.insert(record.question_id.clone(), revision);
            records.push(record);
        }
        PushStart::Ready(PushBatch { records, revisions })
    }

    /// Settles a push. Only ids whose revision did not move since capture leave the
    /// pending set; a failure leaves the set untouched.
    pub fn complete_push(
        &mut self,
        batch: &PushBatch,
        ledger: &AnswerLedger,
        result: Result<(), String>,
        now: OffsetDateTime,
    ) -> PushOutcome {
        self.in_flight = false;

        match result {
            Ok(()) => {
                let mut confirmed = 0;
                for (question_id, revision) in &batch.revisions {
                    if ledger.revision(question_id) == Some(*revision)
                        && self.pending_question_ids.remove(question_id)
                    {
                        confirmed += 1;
                    }
                }
                self.last_synced_at = Some(now);
                self.last_sync_error = None;
                PushOutcome::Pushed { confirmed, still_pending: self.pending_question_ids.len() }
            }
            Err(error) => {
                self.last_sync_error = Some(error.clone());
                PushOutcome::Failed { error }
            }
        }
    }
}

/// When the next autosave push is due: a debounce after each mutation, a fixed
/// safety interval, and an explicit request (navigation, deferred pushes).
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    debounce: Duration,
    interval: Duration,
    debounce_deadline: Option<OffsetDateTime>,
    next_interval_at: OffsetDateTime,
    immediate: bool,
}

impl AutosaveScheduler {
    pub fn new(
        debounce: std::time::Duration,
        interval: std::time::Duration,
        now: OffsetDateTime,
    ) -> Self {
        let debounce = Duration::try_from(debounce).unwrap_or(Duration::MAX);
        let interval = Duration::try_from(interval).unwrap_or(Duration::MAX);
        Self {
            debounce,
            interval,
            debounce_deadline: None,
            next_interval_at: now.checked_add(interval).unwrap_or(now),
            immediate: false,
        }
    }

    /// Restarts the debounce window.
    pub fn note_mutation(&mut self, now: OffsetDateTime) {
        self.debounce_deadline = Some(now.checked_add(self.debounce).unwrap_or(now));
    }

    pub fn request_immediate(&mut self) {
        self.immediate = true;
    }

    pub fn is_due(&self, now: OffsetDateTime, has_pending: bool) -> bool {
        if !has_pending {
            return false;
        }
        self.immediate
            || self.debounce_deadline.is_some_and(|deadline| now >= deadline)
            || now >= self.next_interval_at
    }

    /// Called after any push attempt, successful or not. Retries wait for the next trigger.
    pub fn mark_pushed(&mut self, now: OffsetDateTime) {
        self.immediate = false;
        self.debounce_deadline = None;
        self.next_interval_at = now.checked_add(self.interval).unwrap_or(now);
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::schemas::answer::AnswerValue;

    const T0: OffsetDateTime = datetime!(2025-03-01 08:00:00 UTC);

    fn ledger_with(ids: &[&str]) -> (AnswerLedger, SyncState) {
        let mut ledger = AnswerLedger::new();
        let mut sync = SyncState::default();
        for id in ids {
            ledger.set_answer(id, AnswerValue::text("x"), T0);
            sync.mark_pending(id);
        }
        (ledger, sync)
    }

    fn ready(start: PushStart) -> PushBatch {
        match start {
            PushStart::Ready(batch) => batch,
            other => panic!("expected a batch, got {other:?}"),
        }
    }

    #[test]
    fn success_clears_only_unchanged_ids() {
        let (mut ledger, mut sync) = ledger_with(&["q1", "q2"]);
        let batch = ready(sync.begin_push(&ledger));
        assert_eq!(batch.records.len(), 2);

        ledger.set_answer("q2", AnswerValue::text("edited mid-flight"), T0);
        sync.mark_pending("q2");
        ledger.set_answer("q3", AnswerValue::text("new"), T0);
        sync.mark_pending("q3");

        let outcome = sync.complete_push(&batch, &ledger, Ok(()), T0);
        assert_eq!(outcome, PushOutcome::Pushed { confirmed: 1, still_pending: 2 });
        assert!(!sync.is_pending("q1"));
        assert!(sync.is_pending("q2"));
        assert!(sync.is_pending("q3"));
        assert_eq!(sync.last_synced_at(), Some(T0));
    }

    #[test]
    fn failure_leaves_pending_untouched() {
        let (ledger, mut sync) = ledger_with(&["q1"]);
        let batch = ready(sync.begin_push(&ledger));
        let outcome = sync.complete_push(&batch, &ledger, Err("offline".to_string()), T0);

        assert_eq!(outcome, PushOutcome::Failed { error: "offline".to_string() });
        assert!(sync.is_pending("q1"));
        assert_eq!(sync.last_sync_error(), Some("offline"));
        assert!(!sync.in_flight());
    }

    #[test]
    fn second_push_while_in_flight_is_deferred() {
        let (ledger, mut sync) = ledger_with(&["q1"]);
        let batch = ready(sync.begin_push(&ledger));
        assert_eq!(sync.begin_push(&ledger), PushStart::Deferred);
        assert!(sync.take_deferred());
        assert!(!sync.take_deferred());

        sync.complete_push(&batch, &ledger, Ok(()), T0);
        assert_eq!(sync.begin_push(&ledger), PushStart::Idle);
    }

    #[test]
    fn scheduler_triggers() {
        let debounce = std::time::Duration::from_millis(1500);
        let interval = std::time::Duration::from_secs(30);
        let mut scheduler = AutosaveScheduler::new(debounce, interval, T0);

        assert!(!scheduler.is_due(T0 + Duration::seconds(60), false));
        assert!(!scheduler.is_due(T0, true));

        scheduler.note_mutation(T0);
        assert!(!scheduler.is_due(T0 + Duration::seconds(1), true));
        assert!(scheduler.is_due(T0 + Duration::milliseconds(1500), true));

        scheduler.mark_pushed(T0 + Duration::seconds(2));
        assert!(!scheduler.is_due(T0 + Duration::seconds(3), true));
        assert!(scheduler.is_due(T0 + Duration::seconds(32), true));

        scheduler.mark_pushed(T0 + Duration::seconds(32));
        scheduler.request_immediate();
        assert!(scheduler.is_due(T0 + Duration::seconds(32), true));
    }
}
