use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::repositories::kv::{KvBackend, MemoryKv};
use crate::schemas::contest::ContestProgressMap;
use crate::schemas::types::ContestExamStatus;

const STORE_NAME: &str = "contest_progress";

pub fn contest_key(contest_id: &str) -> String {
    format!("contest_progress:{contest_id}")
}

/// Locally observed contest statuses, used until the server catches up.
#[derive(Clone)]
pub struct ContestProgressCache {
    backend: Arc<dyn KvBackend>,
}

impl ContestProgressCache {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    /// Missing or unreadable progress reads as an empty map. A malformed entry is dropped
    /// on its own and the other entries are kept.
    pub async fn load(&self, contest_id: &str) -> ContestProgressMap {
        let raw = match self.backend.get(&contest_key(contest_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ContestProgressMap::new(),
            Err(err) => {
                crate::core::metrics::record_store_failure(STORE_NAME, "load");
                tracing::warn!(contest_id, error = %err, "Failed to read contest progress");
                return ContestProgressMap::new();
            }
        };

        let entries = match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(contest_id, error = %err, "Ignoring malformed contest progress");
                return ContestProgressMap::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|(exam_id, value)| match serde_json::from_value(value) {
                Ok(status) => Some((exam_id, status)),
                Err(err) => {
                    tracing::warn!(
                        contest_id,
                        exam_id = %exam_id,
                        error = %err,
                        "Ignoring malformed contest progress entry"
                    );
                    None
                }
            })
            .collect()
    }

    /// Records a status for one exam. A `completed` entry is never overwritten.
    pub async fn mark(&self, contest_id: &str, exam_id: &str, status: ContestExamStatus) {
        let mut progress = self.load(contest_id).await;
        if progress.get(exam_id) == Some(&ContestExamStatus::Completed) {
            return;
        }
        progress.insert(exam_id.to_string(), status);

        let raw = match serde_json::to_string(&progress) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(contest_id, error = %err, "Failed to encode contest progress");
                return;
            }
        };
        if let Err(err) = self.backend.set(&contest_key(contest_id), raw).await {
            crate::core::metrics::record_store_failure(STORE_NAME, "save");
            tracing::warn!(contest_id, exam_id, error = %err, "Failed to save contest progress");
        }
    }

    pub async fn clear(&self, contest_id: &str) {
        if let Err(err) = self.backend.remove(&contest_key(contest_id)).await {
            crate::core::metrics::record_store_failure(STORE_NAME, "clear");
            tracing::warn!(contest_id, error = %err, "Failed to clear contest progress");
        }
    }
}
