//! Infrastructure services

mod knowledge_base_service;

pub use knowledge_base_service::{
    CreateKnowledgeBaseRequest, KnowledgeBaseService, UpdateKnowledgeBaseRequest,
};
