use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schemas::types::ContestExamStatus;

/// Per-contest local cache: exam id to last locally observed status.
pub type ContestProgressMap = BTreeMap<String, ContestExamStatus>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestExamRef {
    pub exam_id: String,
    pub order: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestParticipation {
    #[serde(default)]
    pub completed_exam_ids: Vec<String>,
    #[serde(default)]
    pub current_status_per_exam: BTreeMap<String, ContestExamStatus>,
}

impl ContestParticipation {
    /// Completion listed in `completedExamIds` outranks the per-exam status map.
    pub fn status_of(&self, exam_id: &str) -> Option<ContestExamStatus> {
        if self.completed_exam_ids.iter().any(|id| id == exam_id) {
            return Some(ContestExamStatus::Completed);
        }
        self.current_status_per_exam.get(exam_id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestProgressEntry {
    pub exam_id: String,
    pub order: u32,
    pub server_status: ContestExamStatus,
    #[serde(default)]
    pub local_status: Option<ContestExamStatus>,
}

impl ContestProgressEntry {
    pub fn new(
        exam_id: impl Into<String>,
        order: u32,
        server_status: ContestExamStatus,
        local_status: Option<ContestExamStatus>,
    ) -> Self {
        Self { exam_id: exam_id.into(), order, server_status, local_status }
    }
}

/// Effective, displayable status of one contest exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestEntryView {
    pub exam_id: String,
    pub order: u32,
    pub status: ContestExamStatus,
}
