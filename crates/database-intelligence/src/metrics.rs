//! Prometheus metrics for the two pipelines and the provider clients.

use prometheus::{Encoder, TextEncoder, Registry, IntCounterVec, Histogram};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static PIPELINE_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static PROVIDER_RETRIES: OnceLock<IntCounterVec> = OnceLock::new();
static PROGRESS_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();
static QUERY_EXECUTION_SECONDS: OnceLock<Histogram> = OnceLock::new();

pub fn init_metrics() {
    let pipeline_requests = PIPELINE_REQUESTS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("pipeline_requests_total", "Pipeline runs per flow and outcome"),
            &["flow", "outcome"],
        )
        .expect("static metric definition")
    });

    let provider_retries = PROVIDER_RETRIES.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("provider_retries_total", "Rate-limit retries per provider"),
            &["provider"],
        )
        .expect("static metric definition")
    });

    let progress_events = PROGRESS_EVENTS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("progress_events_total", "Stage events published per topic"),
            &["topic"],
        )
        .expect("static metric definition")
    });

    let query_execution_seconds = QUERY_EXECUTION_SECONDS.get_or_init(|| {
        Histogram::with_opts(prometheus::HistogramOpts::new(
            "query_execution_seconds",
            "Wall time of read-only query executions",
        ))
        .expect("static metric definition")
    });

    REGISTRY.register(Box::new(pipeline_requests.clone())).ok();
    REGISTRY.register(Box::new(provider_retries.clone())).ok();
    REGISTRY.register(Box::new(progress_events.clone())).ok();
    REGISTRY.register(Box::new(query_execution_seconds.clone())).ok();
}

pub fn inc_pipeline(flow: &str, outcome: &str) {
    if let Some(counter) = PIPELINE_REQUESTS.get() {
        counter.with_label_values(&[flow, outcome]).inc();
    }
}

pub fn inc_provider_retry(provider: &str) {
    if let Some(counter) = PROVIDER_RETRIES.get() {
        counter.with_label_values(&[provider]).inc();
    }
}

pub fn inc_progress_event(topic: &str) {
    if let Some(counter) = PROGRESS_EVENTS.get() {
        counter.with_label_values(&[topic]).inc();
    }
}

pub fn observe_query_execution(duration_secs: f64) {
    if let Some(histogram) = QUERY_EXECUTION_SECONDS.get() {
        histogram.observe(duration_secs);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
