//! Infrastructure layer - storage backends, embedding providers and the
//! ingestion and retrieval services built on them

pub mod embedding;
pub mod ingestion;
pub mod logging;
pub mod observability;
pub mod retrieval;
pub mod services;
pub mod storage;
