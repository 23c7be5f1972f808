use std::sync::Arc;

use anyhow::Context;

use crate::core::{
    config::Settings,
    time::{Clock, SystemClock},
};
use crate::repositories::contest_progress::ContestProgressCache;
use crate::repositories::kv::{self, KvBackend};
use crate::repositories::progress::LocalProgressStore;
use crate::schemas::contest::ContestExamRef;
use crate::schemas::exam::ExamDefinition;
use crate::services::contest_unlock::ContestTracker;
use crate::services::exam_session::{ExamSession, SessionError, SessionOptions};
use crate::services::http_backend::HttpExamBackend;
use crate::services::remote::{ContestBackend, SubmissionBackend};

/// Shared wiring for sessions and contest trackers.
#[derive(Clone)]
pub struct EngineState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    kv: Arc<dyn KvBackend>,
    submissions: Arc<dyn SubmissionBackend>,
    contests: Arc<dyn ContestBackend>,
    clock: Arc<dyn Clock>,
}

impl EngineState {
    pub fn new(
        settings: Settings,
        kv: Arc<dyn KvBackend>,
        submissions: Arc<dyn SubmissionBackend>,
        contests: Arc<dyn ContestBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, kv, submissions, contests, clock }) }
    }

    /// Configured store backend, HTTP collaborators and the system clock.
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let kv = kv::backend_from_settings(&settings).await;
        let http = Arc::new(
            HttpExamBackend::from_settings(&settings).context("Failed to build exam API client")?,
        );
        tracing::info!(
            store = kv.name(),
            remote = %settings.remote().base_url,
            "Engine state ready"
        );
        Ok(Self::new(settings, kv, http.clone(), http, Arc::new(SystemClock)))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub fn progress_store(&self) -> LocalProgressStore {
        LocalProgressStore::new(self.inner.kv.clone())
    }

    pub fn contest_cache(&self) -> ContestProgressCache {
        ContestProgressCache::new(self.inner.kv.clone())
    }

    pub fn session(&self, definition: ExamDefinition) -> Result<ExamSession, SessionError> {
        ExamSession::new(
            definition,
            self.inner.submissions.clone(),
            self.progress_store(),
            self.clock(),
            SessionOptions::from_settings(&self.inner.settings),
        )
    }

    pub fn contest_tracker(
        &self,
        contest_id: impl Into<String>,
        exams: Vec<ContestExamRef>,
    ) -> ContestTracker {
        ContestTracker::new(contest_id, exams, self.inner.contests.clone(), self.contest_cache())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::repositories::kv::MemoryKv;
    use crate::schemas::submission::StartOptions;
    use crate::test_support::{self, FakeBackend, EXAM_ID};

    fn settings() -> Settings {
        Settings::from_source(|key| match key {
            "AUTOSAVE_DEBOUNCE_MS" => Some("250".to_string()),
            "PROGRESS_STORE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .expect("settings")
    }

    #[tokio::test]
    async fn sessions_share_the_configured_store() {
        let backend = FakeBackend::new();
        let state = EngineState::new(
            settings(),
            Arc::new(MemoryKv::new()),
            backend.clone(),
            backend.clone(),
            Arc::new(test_support::clock()),
        );

        let session = state.session(test_support::definition()).expect("session");
        assert_eq!(session.options().autosave_debounce, Duration::from_millis(250));
        session.start_fresh(&StartOptions::default()).await.unwrap();

        assert!(state.progress_store().has_progress(EXAM_ID).await);
        let board = state.contest_tracker("c-1", Vec::new()).board().await;
        assert!(board.entries().is_empty());
    }

    #[tokio::test]
    async fn from_settings_builds_memory_backed_state() {
        let state = EngineState::from_settings(settings()).await.expect("state");
        assert_eq!(state.settings().store().backend.as_str(), "memory");
        assert!(!state.progress_store().has_progress(EXAM_ID).await);
    }
}
