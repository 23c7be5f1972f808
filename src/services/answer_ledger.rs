use std::collections::{BTreeMap, BTreeSet};

use time::OffsetDateTime;

use crate::schemas::answer::{AnswerRecord, AnswerValue};

#[derive(Debug, Clone)]
struct LedgerEntry {
    record: AnswerRecord,
    revision: u64,
}

/// In-memory answer state for one attempt, keyed by question id.
///
/// Every mutation bumps a per-record revision. Autosave captures revisions at push
/// start and only treats a question as synced if its revision did not move meanwhile.
#[derive(Debug, Clone, Default)]
pub struct AnswerLedger {
    entries: BTreeMap<String, LedgerEntry>,
    next_revision: u64,
}

/// Result of merging server answers with a local snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedAnswers {
    pub records: Vec<AnswerRecord>,
    /// Questions whose local record won, so the server has not seen them yet.
    pub local_wins: BTreeSet<String>,
}

impl AnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn entry_mut(&mut self, question_id: &str, now: OffsetDateTime) -> &mut LedgerEntry {
        self.entries.entry(question_id.to_string()).or_insert_with(|| LedgerEntry {
            record: AnswerRecord::new(question_id, now),
            revision: 0,
        })
    }

    /// Replaces the value, derives `is_answered` and stamps `last_modified`.
    pub fn set_answer(
        &mut self,
        question_id: &str,
        value: AnswerValue,
        now: OffsetDateTime,
    ) -> u64 {
        let revision = self.bump();
        let entry = self.entry_mut(question_id, now);
        entry.record.value = Some(value);
        entry.record.derive_answered();
        entry.record.last_modified = now;
        entry.revision = revision;
        revision
    }

    /// Flips the flag and returns its new state.
    pub fn toggle_flag(&mut self, question_id: &str, now: OffsetDateTime) -> bool {
        let revision = self.bump();
        let entry = self.entry_mut(question_id, now);
        entry.record.is_flagged = !entry.record.is_flagged;
        entry.record.last_modified = now;
        entry.revision = revision;
        entry.record.is_flagged
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.entries.get(question_id).map(|entry| &entry.record)
    }

    pub fn revision(&self, question_id: &str) -> Option<u64> {
        self.entries.get(question_id).map(|entry| entry.revision)
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.get(question_id).is_some_and(|record| record.is_flagged)
    }

    pub fn is_answered(&self, question_id: &str) -> bool {
        self.get(question_id).is_some_and(|record| record.is_answered)
    }

    pub fn answered_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.record.is_answered).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All records ordered by question id.
    pub fn snapshot(&self) -> Vec<AnswerRecord> {
        self.entries.values().map(|entry| entry.record.clone()).collect()
    }

    /// Records with their current revision, skipping ids the ledger does not hold.
    pub fn records_for<'a, I>(&self, question_ids: I) -> Vec<(AnswerRecord, u64)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        question_ids
            .into_iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| (entry.record.clone(), entry.revision))
            .collect()
    }

    /// Bulk replace. `is_answered` is recomputed rather than trusted.
    pub fn hydrate(&mut self, records: Vec<AnswerRecord>) {
        self.entries.clear();
        for mut record in records {
            record.derive_answered();
            let revision = self.bump();
            self.entries.insert(record.question_id.clone(), LedgerEntry { record, revision });
        }
    }
}

/// Per question, the later `last_modified` wins. Ties go to the server.
pub fn merge_last_write_wins(server: Vec<AnswerRecord>, local: Vec<AnswerRecord>) -> MergedAnswers {
    let mut merged: BTreeMap<String, AnswerRecord> =
        server.into_iter().map(|record| (record.question_id.clone(), record)).collect();
    let mut local_wins = BTreeSet::new();

    for record in local {
        let local_is_newer = merged
            .get(&record.question_id)
            .map_or(true, |server| record.last_modified > server.last_modified);
        if local_is_newer {
            local_wins.insert(record.question_id.clone());
            merged.insert(record.question_id.clone(), record);
        }
    }

    MergedAnswers { records: merged.into_values().collect(), local_wins }
}
