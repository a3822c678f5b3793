use super::GLOBAL_LABELS;
use crate::config::from_env_or_panic;
use metrics::Unit;
use serde::Deserialize;
use std::time::Duration;

/// Histogram buckets to measure the distribution of durations in seconds.
/// Registry exports and LLM completions are slow, hence the long tail.
pub(crate) const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    900.0,
];

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_port")]
    port: u16,
}

fn default_port() -> u16 {
    2000
}

pub fn init_metrics() {
    let config: MetricsConfig = from_env_or_panic("METRICS_");

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .set_buckets(DEFAULT_DURATION_BUCKETS)
        .expect("BUG: default duration buckets must not be empty");

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder
        .install()
        .expect("BUG: failed to initialize the metrics listener");

    describe();
}

fn describe() {
    metrics::describe_counter!(
        "scheduler_runs_total",
        "Number of scheduler run attempts labeled by their outcome"
    );
    metrics::describe_histogram!(
        "scheduler_run_duration_seconds",
        Unit::Seconds,
        "Duration of a full scheduler run over all subscribed regions"
    );
    metrics::describe_counter!(
        "registry_records_total",
        "Number of registry records seen by the pipeline labeled by what happened to them"
    );
    metrics::describe_counter!(
        "notifications_total",
        "Number of attempted notification deliveries labeled by their outcome"
    );
    metrics::describe_counter!(
        "llm_completions_total",
        "Number of LLM completion attempts labeled by their outcome"
    );
    metrics::describe_counter!(
        "lead_cache_lookups_total",
        "Number of lead cache lookups labeled by hit or miss"
    );
    metrics::describe_counter!(
        "tg_updates_total",
        "Number of updates received from Telegram"
    );
    metrics::describe_counter!(
        "tg_updates_skipped_total",
        "Number of updates received from Telegram, that were skipped by the bot"
    );
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Duration of a single real http request, every retry is a separate observation"
    );
    metrics::describe_histogram!(
        "http_request_effective_duration_seconds",
        Unit::Seconds,
        "Duration of an http request including all of its retries"
    );
}

pub(crate) fn scheduler_run(outcome: &'static str) {
    metrics::increment_counter!("scheduler_runs_total", "outcome" => outcome);
}

pub(crate) fn scheduler_run_duration(duration: Duration) {
    metrics::histogram!("scheduler_run_duration_seconds", duration);
}

pub(crate) fn registry_records(outcome: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!("registry_records_total", count as u64, "outcome" => outcome);
}

pub(crate) fn notification(outcome: &'static str) {
    metrics::increment_counter!("notifications_total", "outcome" => outcome);
}

pub(crate) fn llm_completion(outcome: &'static str) {
    metrics::increment_counter!("llm_completions_total", "outcome" => outcome);
}

pub(crate) fn lead_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::increment_counter!("lead_cache_lookups_total", "result" => result);
}

pub(crate) fn tg_update(kind: &'static str) {
    metrics::increment_counter!("tg_updates_total", "kind" => kind);
}

pub(crate) fn tg_update_skipped(kind: &'static str) {
    metrics::increment_counter!("tg_updates_skipped_total", "kind" => kind);
}
