//! Views derived from the exam definition, the ledger and the cursor. All pure.

use serde::Serialize;

use crate::schemas::exam::{ExamDefinition, QuestionRef};
use crate::services::answer_ledger::AnswerLedger;

pub const DEFAULT_SECTION: &str = "Part I";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionLayout {
    Single,
    /// Passage on one side, question on the other.
    Split {
        passage_id: String,
        passage_title: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationItem {
    pub question_id: String,
    pub number: usize,
    pub is_answered: bool,
    pub is_flagged: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionGroup {
    pub name: String,
    pub items: Vec<NavigationItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMarker {
    pub number: usize,
    pub section: String,
    pub question_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStats {
    pub total: usize,
    pub answered: usize,
    pub unanswered: Vec<QuestionMarker>,
    pub flagged: Vec<QuestionMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStatus {
    pub is_last_in_section: bool,
    pub is_last_question: bool,
}

fn section_of(question: &QuestionRef) -> &str {
    question.section.as_deref().unwrap_or(DEFAULT_SECTION)
}

fn marker(index: usize, question: &QuestionRef) -> QuestionMarker {
    QuestionMarker {
        number: index + 1,
        section: section_of(question).to_string(),
        question_id: question.question_id.clone(),
    }
}

/// Split view only when the question links a passage that actually exists.
pub fn layout_for(definition: &ExamDefinition, index: usize) -> QuestionLayout {
    definition
        .questions
        .get(index)
        .and_then(|question| question.linked_passage_id.as_deref())
        .and_then(|passage_id| definition.passage(passage_id))
        .map_or(QuestionLayout::Single, |passage| QuestionLayout::Split {
            passage_id: passage.id.clone(),
            passage_title: passage.title.clone(),
        })
}

/// Questions grouped by section, sections in order of first appearance.
pub fn section_overview(
    definition: &ExamDefinition,
    ledger: &AnswerLedger,
    cursor: usize,
) -> Vec<SectionGroup> {
    let mut groups: Vec<SectionGroup> = Vec::new();

    for (index, question) in definition.questions.iter().enumerate() {
        let item = NavigationItem {
            question_id: question.question_id.clone(),
            number: index + 1,
            is_answered: ledger.is_answered(&question.question_id),
            is_flagged: ledger.is_flagged(&question.question_id),
            is_current: index == cursor,
        };

        let name = section_of(question);
        match groups.iter_mut().find(|group| group.name == name) {
            Some(group) => group.items.push(item),
            None => groups.push(SectionGroup { name: name.to_string(), items: vec![item] }),
        }
    }

    groups
}

pub fn submit_stats(definition: &ExamDefinition, ledger: &AnswerLedger) -> SubmitStats {
    let mut answered = 0;
    let mut unanswered = Vec::new();
    let mut flagged = Vec::new();

    for (index, question) in definition.questions.iter().enumerate() {
        if ledger.is_answered(&question.question_id) {
            answered += 1;
        } else {
            unanswered.push(marker(index, question));
        }
        if ledger.is_flagged(&question.question_id) {
            flagged.push(marker(index, question));
        }
    }

    SubmitStats { total: definition.questions.len(), answered, unanswered, flagged }
}

pub fn navigation_status(definition: &ExamDefinition, cursor: usize) -> NavigationStatus {
    let Some(current) = definition.questions.get(cursor) else {
        return NavigationStatus::default();
    };
    let section = section_of(current);
    let last_in_section = definition
        .questions
        .iter()
        .rposition(|question| section_of(question) == section)
        .is_some_and(|last| last == cursor);

    NavigationStatus {
        is_last_in_section: last_in_section,
        is_last_question: cursor + 1 == definition.questions.len(),
    }
}
