//! Counters and histograms over the `metrics` facade
//!
//! Nothing is exported from this crate: without an installed recorder every
//! call is a no-op. An embedding application installs its own recorder
//! (Prometheus, StatsD, ...) to collect them.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};

/// Register descriptions and the build info gauge with the active recorder
pub fn describe_metrics() {
    describe_counter!("embedding_requests_total", "Embedding provider calls");
    describe_histogram!(
        "embedding_request_duration_seconds",
        Unit::Seconds,
        "Embedding provider call latency"
    );
    describe_counter!("embedding_retries_total", "Embedding calls retried after a failure");
    describe_counter!("ingestions_total", "Documents ingested, by outcome");
    describe_counter!("ingestion_chunks_total", Unit::Count, "Chunks persisted");
    describe_histogram!(
        "ingestion_duration_seconds",
        Unit::Seconds,
        "End-to-end ingestion latency"
    );
    describe_counter!("retrievals_total", "Hybrid retrievals, by outcome");
    describe_histogram!(
        "retrieval_duration_seconds",
        Unit::Seconds,
        "End-to-end retrieval latency"
    );
    describe_histogram!("retrieval_results", Unit::Count, "Chunks returned per retrieval");

    gauge!("kb_retrieval_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Parameters for embedding request metrics
pub struct EmbeddingRequestMetricParams<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub duration: Duration,
    pub success: bool,
    pub texts: usize,
}

/// Record one embedding provider attempt
pub fn record_embedding_request(params: EmbeddingRequestMetricParams) {
    let labels = [
        ("provider", params.provider.to_string()),
        ("model", params.model.to_string()),
        ("status", status(params.success).to_string()),
    ];

    counter!("embedding_requests_total", &labels).increment(1);
    counter!("embedding_texts_total", &labels).increment(params.texts as u64);
    histogram!("embedding_request_duration_seconds", &labels)
        .record(params.duration.as_secs_f64());

    if !params.success {
        counter!("embedding_errors_total", &labels).increment(1);
    }
}

pub fn record_embedding_retry(provider: &str) {
    counter!("embedding_retries_total", "provider" => provider.to_string()).increment(1);
}

/// Parameters for ingestion metrics
pub struct IngestionMetricParams<'a> {
    /// Last stage reached on success, failing stage otherwise
    pub stage: &'a str,
    pub success: bool,
    pub chunks: usize,
    pub duration: Duration,
}

pub fn record_ingestion(params: IngestionMetricParams) {
    let labels = [
        ("stage", params.stage.to_string()),
        ("status", status(params.success).to_string()),
    ];

    counter!("ingestions_total", &labels).increment(1);
    histogram!("ingestion_duration_seconds", &labels).record(params.duration.as_secs_f64());

    if params.success {
        counter!("ingestion_chunks_total").increment(params.chunks as u64);
    }
}

/// Parameters for retrieval metrics
pub struct RetrievalMetricParams {
    pub knowledge_bases: usize,
    pub results: usize,
    pub vector_weight: f32,
    pub duration: Duration,
    pub success: bool,
}

pub fn record_retrieval(params: RetrievalMetricParams) {
    let labels = [
        ("mode", weight_mode(params.vector_weight).to_string()),
        ("status", status(params.success).to_string()),
    ];

    counter!("retrievals_total", &labels).increment(1);
    histogram!("retrieval_duration_seconds", &labels).record(params.duration.as_secs_f64());

    if params.success {
        histogram!("retrieval_results").record(params.results as f64);
        histogram!("retrieval_knowledge_bases").record(params.knowledge_bases as f64);
    }
}

fn status(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

/// Bounded label for the vector weight
fn weight_mode(vector_weight: f32) -> &'static str {
    if vector_weight >= 1.0 {
        "vector"
    } else if vector_weight <= 0.0 {
        "lexical"
    } else {
        "hybrid"
    }
}
