use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Read-only description of an exam, as handed to the session engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExamDefinition {
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub exam_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject: String,
    #[validate(range(min = 1, message = "duration_seconds must be positive"))]
    pub duration_seconds: u32,
    #[validate(length(min = 1, message = "exam must contain at least one question"))]
    pub questions: Vec<QuestionRef>,
    #[serde(default)]
    pub passages: Vec<ReadingPassage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRef {
    pub question_id: String,
    pub order: u32,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub max_score: f64,
    #[serde(default)]
    pub linked_passage_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPassage {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl ExamDefinition {
    /// Validates the definition and sorts questions by `order`.
    pub fn prepared(mut self) -> Result<Self, String> {
        self.validate().map_err(|err| err.to_string())?;

        let mut seen = HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            if question.question_id.trim().is_empty() {
                return Err("question_id must not be empty".to_string());
            }
            if !seen.insert(question.question_id.as_str()) {
                return Err(format!("duplicate question_id '{}'", question.question_id));
            }
        }

        self.questions.sort_by_key(|question| question.order);
        Ok(self)
    }

    pub fn question_index(&self, question_id: &str) -> Option<usize> {
        self.questions.iter().position(|question| question.question_id == question_id)
    }

    pub fn contains_question(&self, question_id: &str) -> bool {
        self.question_index(question_id).is_some()
    }

    pub fn passage(&self, passage_id: &str) -> Option<&ReadingPassage> {
        self.passages.iter().find(|passage| passage.id == passage_id)
    }

    pub fn max_score(&self) -> f64 {
        self.questions.iter().map(|question| question.max_score).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, order: u32) -> QuestionRef {
        QuestionRef {
            question_id: id.to_string(),
            order,
            section: None,
            max_score: 1.0,
            linked_passage_id: None,
        }
    }

    fn definition(questions: Vec<QuestionRef>) -> ExamDefinition {
        ExamDefinition {
            exam_id: "exam-1".to_string(),
            title: "Mock".to_string(),
            subject: "Math".to_string(),
            duration_seconds: 600,
            questions,
            passages: Vec::new(),
        }
    }

    #[test]
    fn prepared_sorts_by_order() {
        let prepared =
            definition(vec![question("q2", 2), question("q1", 1)]).prepared().expect("valid");
        assert_eq!(prepared.questions[0].question_id, "q1");
        assert_eq!(prepared.question_index("q2"), Some(1));
        assert_eq!(prepared.max_score(), 2.0);
    }

    #[test]
    fn prepared_rejects_duplicates_and_empty_exams() {
        let err = definition(vec![question("q1", 1), question("q1", 2)]).prepared().unwrap_err();
        assert!(err.contains("duplicate"));

        assert!(definition(Vec::new()).prepared().is_err());

        let mut zero = definition(vec![question("q1", 1)]);
        zero.duration_seconds = 0;
        assert!(zero.prepared().is_err());
    }
}
