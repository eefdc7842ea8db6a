use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Only one per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_alerts_triggered_total", "Alerts that took the active slot.");
        describe_counter!(
            "pulse_alerts_suppressed_total",
            "Alert candidates dropped because an alert was already active."
        );
        describe_counter!("pulse_alerts_dismissed_total", "Active alerts dismissed.");
        describe_counter!(
            "pulse_breaking_detected_total",
            "Items newly qualified as breaking, per channel."
        );
        describe_counter!("pulse_channel_ticks_total", "Completed channel ticks.");
        describe_counter!(
            "pulse_channel_errors_total",
            "Channel handler failures and panics."
        );
        describe_counter!(
            "pulse_content_skipped_total",
            "Malformed content items skipped."
        );
        describe_counter!(
            "pulse_source_fallback_total",
            "Loads served from the static default set after a live failure."
        );
        describe_histogram!("pulse_source_fetch_ms", "Live feed fetch time in milliseconds.");
        describe_gauge!(
            "pulse_channel_last_sync_ts",
            "Unix ts of the channel's last completed sync."
        );
    });
}
