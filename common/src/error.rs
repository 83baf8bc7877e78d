use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Vector store error: {0}")]
    VectorStore(String),
    #[error("Embedding error: {0}")]
    Embedding(#[from] anyhow::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("LLM response error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl From<qdrant_client::QdrantError> for AppError {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Self::VectorStore(err.to_string())
    }
}
