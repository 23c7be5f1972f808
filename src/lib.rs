pub mod core;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::Context;

pub use crate::core::config::Settings;
pub use crate::core::state::EngineState;
pub use crate::core::time::{Clock, ManualClock, SystemClock};
pub use crate::repositories::contest_progress::ContestProgressCache;
pub use crate::repositories::kv::{FileKv, KvBackend, MemoryKv, StoreError};
pub use crate::repositories::progress::LocalProgressStore;
pub use crate::services::contest_unlock::{ContestBoard, ContestError, ContestTracker, StartAction};
pub use crate::services::exam_session::{
    ExamSession, SessionError, SessionEvent, SessionOptions, SubmitOutcome, TickReport,
};
pub use crate::services::http_backend::HttpExamBackend;
pub use crate::services::remote::{BackendError, ContestBackend, SubmissionBackend};
pub use crate::tasks::session_driver::{spawn as spawn_session_driver, SessionDriver};

/// Loads `.env` and settings, then installs tracing and the metrics recorder.
pub fn init() -> anyhow::Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load exam engine settings")?;
    core::telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tracing::info!(
        environment = %settings.runtime().environment.as_str(),
        store = settings.store().backend.as_str(),
        "Exam engine initialised"
    );

    Ok(settings)
}

/// [`init`] followed by [`EngineState::from_settings`].
pub async fn bootstrap() -> anyhow::Result<EngineState> {
    let settings = init()?;
    EngineState::from_settings(settings).await
}
