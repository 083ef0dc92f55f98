//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, ChunkingSettings, EmbeddingSettings, LogFormat, LoggingConfig, RetrievalSettings,
    StorageSettings,
};
