use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder when enabled. Without it the `metrics` macros are no-ops.
pub fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

/// Renders the current scrape body, if the recorder is installed.
pub fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_autosave_push(outcome: &'static str) {
    metrics::counter!("exam_autosave_push_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_finalize(outcome: &'static str, trigger: &'static str) {
    metrics::counter!("exam_finalize_total", "outcome" => outcome, "trigger" => trigger)
        .increment(1);
}

pub(crate) fn record_store_failure(store: &'static str, op: &'static str) {
    metrics::counter!("exam_progress_store_failures_total", "store" => store, "op" => op)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_empty_without_recorder() {
        assert!(render().is_none());
        record_autosave_push("ok");
        record_finalize("ok", "manual");
        record_store_failure("progress", "save");
    }
}
