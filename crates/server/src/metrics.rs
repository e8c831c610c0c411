//! Prometheus metrics

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Idempotent; returns the render handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("install prometheus recorder")
        })
        .clone()
}

/// Render the current metrics snapshot for the `/metrics` endpoint.
pub async fn metrics_handler() -> String {
    match HANDLE.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

/// Record one search request with its outcome.
pub fn record_search(endpoint: &'static str, strategy: &str, degraded: bool) {
    metrics::counter!(
        "memsearch_search_requests_total",
        "endpoint" => endpoint,
        "strategy" => strategy.to_string(),
        "degraded" => if degraded { "true" } else { "false" },
    )
    .increment(1);
}

/// Record search latency in milliseconds.
pub fn record_search_latency(endpoint: &'static str, took_ms: u64) {
    metrics::histogram!("memsearch_search_latency_ms", "endpoint" => endpoint)
        .record(took_ms as f64);
}

/// Record one indexed document batch.
pub fn record_indexed(count: usize) {
    metrics::counter!("memsearch_indexed_documents_total").increment(count as u64);
}
