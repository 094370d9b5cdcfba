use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),

    /// Readiness thresholds unmet. Expected, not a fault; carries the
    /// ordered unmet-condition list for caller feedback.
    #[error("Claim not ready for engine creation: {}", reasons.join("; "))]
    NotReady { reasons: Vec<String> },
    /// Engine creation could not index any document. Retryable.
    #[error("Engine creation failed: {0}")]
    CreationFailure(String),
    /// An external capability (embedding, vector store, answer generation)
    /// stayed unavailable after bounded retries. Retryable later.
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// The engine vanished between lookup and use (expiry race). Callers
    /// should retry ensure_engine.
    #[error("No live engine for claim {0}")]
    EngineNotFound(String),
    /// Retrieval produced no usable context; answering would fabricate.
    #[error("Insufficient grounding: {0}")]
    InsufficientGrounding(String),
}

impl AppError {
    /// Whether retrying the same operation later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::CreationFailure(_)
                | AppError::CapabilityUnavailable(_)
                | AppError::EngineNotFound(_)
        )
    }
}
