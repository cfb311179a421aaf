//! Tracing setup and pipeline metrics
//!
//! Metrics go through the `metrics` facade; installing an exporter is left
//! to the embedding application.

use crate::config::TelemetryConfig;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stage executions, labelled by `component` and `outcome`
pub const STAGE_RUNS_TOTAL: &str = "docpipe_stage_runs_total";
/// Stage wall time in seconds, labelled by `component`
pub const STAGE_DURATION_SECONDS: &str = "docpipe_stage_duration_seconds";
/// Annotations merged into documents, labelled by `component`
pub const ANNOTATIONS_MERGED_TOTAL: &str = "docpipe_annotations_merged_total";

/// Install a global `fmt` subscriber
///
/// `RUST_LOG` overrides `config.filter`. If a subscriber is already
/// installed this is a no-op.
///
/// # Errors
/// Returns an error if `config.filter` is not a valid directive
pub fn init_tracing(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_ok() {
        tracing::debug!(filter = %config.filter, json = config.json, "tracing initialized");
    }
    Ok(())
}

pub(crate) fn record_stage(component: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(STAGE_RUNS_TOTAL,
        "component" => component.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(STAGE_DURATION_SECONDS, "component" => component.to_string())
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_merged(component: &str, count: usize) {
    metrics::counter!(ANNOTATIONS_MERGED_TOTAL, "component" => component.to_string())
        .increment(u64::try_from(count).unwrap_or(u64::MAX));
}
