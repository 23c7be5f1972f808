use std::sync::Arc;

use crate::repositories::kv::{KvBackend, MemoryKv, StoreError};
use crate::schemas::submission::AttemptSnapshot;
use crate::schemas::types::AttemptStatus;

const STORE_NAME: &str = "progress";

pub fn progress_key(exam_id: &str) -> String {
    format!("exam_progress:{exam_id}")
}

/// Local Progress Store: one whole-attempt snapshot per exam.
///
/// Nothing here fails to the caller. Backend errors are logged and counted, and a
/// snapshot that cannot be read or parsed is treated as absent.
#[derive(Clone)]
pub struct LocalProgressStore {
    backend: Arc<dyn KvBackend>,
}

impl LocalProgressStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn save(&self, exam_id: &str, snapshot: &AttemptSnapshot) {
        if let Err(err) = self.try_save(exam_id, snapshot).await {
            crate::core::metrics::record_store_failure(STORE_NAME, "save");
            tracing::warn!(
                exam_id,
                backend = self.backend.name(),
                error = %err,
                "Failed to save local progress"
            );
        }
    }

    pub async fn load(&self, exam_id: &str) -> Option<AttemptSnapshot> {
        let raw = match self.backend.get(&progress_key(exam_id)).await {
            Ok(raw) => raw?,
            Err(err) => {
                crate::core::metrics::record_store_failure(STORE_NAME, "load");
                tracing::warn!(
                    exam_id,
                    backend = self.backend.name(),
                    error = %err,
                    "Failed to read local progress"
                );
                return None;
            }
        };

        match serde_json::from_str::<AttemptSnapshot>(&raw) {
            Ok(snapshot) if snapshot.exam_id == exam_id => Some(snapshot),
            Ok(snapshot) => {
                tracing::warn!(
                    exam_id,
                    stored_exam_id = %snapshot.exam_id,
                    "Ignoring local progress stored for another exam"
                );
                None
            }
            Err(err) => {
                crate::core::metrics::record_store_failure(STORE_NAME, "decode");
                tracing::warn!(exam_id, error = %err, "Ignoring corrupted local progress");
                None
            }
        }
    }

    pub async fn has_progress(&self, exam_id: &str) -> bool {
        self.load(exam_id)
            .await
            .is_some_and(|snapshot| snapshot.status == AttemptStatus::InProgress)
    }

    pub async fn clear(&self, exam_id: &str) {
        if let Err(err) = self.backend.remove(&progress_key(exam_id)).await {
            crate::core::metrics::record_store_failure(STORE_NAME, "clear");
            tracing::warn!(exam_id, error = %err, "Failed to clear local progress");
        }
    }

    async fn try_save(&self, exam_id: &str, snapshot: &AttemptSnapshot) -> Result<(), StoreError> {
        let raw = serde_json::to_string(snapshot)?;
        self.backend.set(&progress_key(exam_id), raw).await
    }
}
