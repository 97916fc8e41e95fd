//! External collaborator contracts: LLM inference and embedding computation
//! are consumed, never implemented, by this workspace (spec §1, §6).

use crate::error::{AegisResult, TransientError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A prompt generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop: Vec<String>,
    pub deadline: DateTime<Utc>,
}

/// Classification of an error coming back from the LLM boundary (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone)]
pub struct GenerateError {
    pub kind: GenerateErrorKind,
    pub message: String,
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
impl std::error::Error for GenerateError {}

impl From<GenerateError> for TransientError {
    fn from(e: GenerateError) -> Self {
        TransientError {
            operation: "generate".to_string(),
            reason: e.message,
        }
    }
}

/// Consumed interface: text generation. Implementations wrap whatever LLM
/// backend is configured; this workspace only calls through the trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError>;
}

/// Consumed interface: embedding computation, fixed dimension per process.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> AegisResult<Vec<f32>>;

    /// Dimensionality produced by this client; used by the vector store and
    /// cache to validate inputs before they're ever handed to `embed`.
    fn dimensions(&self) -> usize;
}
