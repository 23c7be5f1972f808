use anyhow::Context;
use tokio::signal;

use exam_engine::schemas::exam::ExamDefinition;
use exam_engine::schemas::submission::StartOptions;
use exam_engine::SessionEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("exam-engine fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

/// Starts or resumes the exam described by the JSON file given as the first argument and
/// drives it until it is submitted. An interrupt leaves the attempt resumable.
async fn run() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).context("usage: exam-engine <exam-definition.json>")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read exam definition {path}"))?;
    let definition: ExamDefinition =
        serde_json::from_str(&raw).context("Failed to parse exam definition")?;

    let state = exam_engine::bootstrap().await?;
    let session = state.session(definition)?;
    let mut events = session.subscribe();

    let attempt = session.resume_or_start(&StartOptions::default()).await?;
    tracing::info!(
        exam_id = %attempt.exam_id,
        remaining_seconds = session.time_remaining().unwrap_or_default(),
        "Session running"
    );

    let driver = exam_engine::spawn_session_driver(session.clone());

    tokio::select! {
        _ = interrupted() => {
            driver.stop().await;
            tracing::info!(exam_id = %attempt.exam_id, "Progress saved; attempt can be resumed");
        }
        _ = async {
            while let Ok(event) = events.recv().await {
                if let SessionEvent::Submitted { submission, trigger, .. } = event {
                    tracing::info!(
                        submission_id = %submission.submission_id,
                        trigger = trigger.as_str(),
                        score = submission.total_score,
                        max_score = submission.max_score,
                        "Exam submitted"
                    );
                    break;
                }
            }
        } => {
            driver.join().await;
        }
    }

    if let Some(rendered) = exam_engine::core::metrics::render() {
        tracing::debug!(metrics = %rendered, "Final metrics snapshot");
    }

    Ok(())
}

async fn interrupted() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Interrupt received");
}
