use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::services::exam_session::ExamSession;

/// Background task owning the tick cadence of one session.
pub struct SessionDriver {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub fn spawn(session: ExamSession) -> SessionDriver {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run(session, shutdown_rx));
    SessionDriver { shutdown, handle }
}

impl SessionDriver {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn stop(self) {
        if self.shutdown.send(true).is_err() {
            tracing::debug!("Session driver already stopped");
        }
        self.join().await;
    }

    /// Waits for the driver to exit on its own, which happens once the session is submitted.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "Session driver join failed");
        }
    }
}

/// Ticks the session until it is submitted or shutdown is signalled. A stale snapshot is
/// saved on the way out.
pub async fn run(session: ExamSession, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(session.options().tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let report = session.tick().await;
                if report.status.is_terminal() {
                    tracing::debug!(
                        exam_id = %session.definition().exam_id,
                        "Session finished; driver exiting"
                    );
                    break;
                }
            }
        }
    }

    session.persist_if_stale().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::repositories::progress::LocalProgressStore;
    use crate::schemas::answer::AnswerValue;
    use crate::schemas::submission::StartOptions;
    use crate::schemas::types::AttemptStatus;
    use crate::test_support::{self, FakeBackend, EXAM_ID};

    #[tokio::test(start_paused = true)]
    async fn driver_force_submits_expired_session() {
        let backend = FakeBackend::new();
        let store = LocalProgressStore::in_memory();
        let clock = test_support::clock();
        let session = test_support::session(&backend, &store, &clock);
        session.start_fresh(&StartOptions::default()).await.unwrap();
        session.update_answer("q1", AnswerValue::text("x")).unwrap();

        clock.advance(time::Duration::seconds(600));
        let driver = spawn(session.clone());
        tokio::time::timeout(Duration::from_secs(5), driver.join()).await.expect("driver exits");

        assert_eq!(session.status(), AttemptStatus::Submitted);
        assert_eq!(backend.submits().len(), 1);
        assert!(store.load(EXAM_ID).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_pushes_after_debounce_and_stops_on_signal() {
        let backend = FakeBackend::new();
        let store = LocalProgressStore::in_memory();
        let clock = test_support::clock();
        let session = test_support::session(&backend, &store, &clock);
        session.start_fresh(&StartOptions::default()).await.unwrap();

        let driver = spawn(session.clone());
        session.update_answer("q2", AnswerValue::text("y")).unwrap();
        clock.advance(time::Duration::seconds(2));
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(backend.pushes().len(), 1);
        assert!(!driver.is_finished());
        driver.stop().await;

        assert_eq!(session.status(), AttemptStatus::InProgress);
        let saved = store.load(EXAM_ID).await.expect("snapshot");
        assert!(saved.answers.iter().any(|record| record.question_id == "q2"));
    }
}
