use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and pre-register application metrics
/// so they appear in scrapes before the first increment.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    counter!("fills_detected_total").absolute(0);
    counter!("fills_skipped_paused_total").absolute(0);
    counter!("fills_skipped_dry_run_total").absolute(0);
    counter!("buys_mirrored_total").absolute(0);
    counter!("buys_refused_total").absolute(0);
    counter!("sells_mirrored_total").absolute(0);
    counter!("mirror_errors_total").absolute(0);
    counter!("monitor_poll_errors_total").absolute(0);
    counter!("redemptions_total").absolute(0);
    counter!("nonce_rescues_total").absolute(0);

    gauge!("monitor_cursor_block").set(0.0);

    handle
}
