use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A student's answer. Serialized as `{"kind": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Options(Vec<String>),
    Structured(BTreeMap<String, String>),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn options<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Options(values.into_iter().map(Into::into).collect())
    }

    /// Blank text, an empty option list and an empty map all count as unanswered.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Options(options) => options.is_empty(),
            AnswerValue::Structured(entries) => entries.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AnswerValue>,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub is_flagged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

impl AnswerRecord {
    pub fn new(question_id: impl Into<String>, last_modified: OffsetDateTime) -> Self {
        Self {
            question_id: question_id.into(),
            value: None,
            is_answered: false,
            is_flagged: false,
            last_modified,
        }
    }

    pub(crate) fn derive_answered(&mut self) {
        self.is_answered = self.value.as_ref().is_some_and(|value| !value.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn value_uses_tagged_representation() {
        let value = AnswerValue::options(["a", "c"]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "options", "value": ["a", "c"]}));

        let structured: AnswerValue = serde_json::from_value(serde_json::json!({
            "kind": "structured",
            "value": {"a": "true", "b": "false"}
        }))
        .unwrap();
        assert!(matches!(structured, AnswerValue::Structured(ref map) if map.len() == 2));
    }

    #[test]
    fn emptiness_per_kind() {
        assert!(AnswerValue::text("   ").is_empty());
        assert!(!AnswerValue::text("x").is_empty());
        assert!(AnswerValue::Options(Vec::new()).is_empty());
        assert!(AnswerValue::Structured(BTreeMap::new()).is_empty());
    }

    #[test]
    fn record_deserialization_ignores_missing_flags() {
        let record: AnswerRecord = serde_json::from_value(serde_json::json!({
            "questionId": "q1",
            "value": {"kind": "text", "value": "x"},
            "lastModified": "2025-03-01T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.question_id, "q1");
        assert!(!record.is_flagged);
        assert_eq!(record.last_modified, datetime!(2025-03-01 08:00:00 UTC));
    }
}
