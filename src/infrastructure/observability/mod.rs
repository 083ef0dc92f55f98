//! Observability infrastructure - metrics facade

mod metrics;

pub use metrics::{
    describe_metrics, record_embedding_request, record_embedding_retry, record_ingestion,
    record_retrieval, EmbeddingRequestMetricParams, IngestionMetricParams,
    RetrievalMetricParams,
};
