// Embedding provider module
// The retriever talks to the model service only through `EmbeddingProvider`.

pub mod openai;
pub mod retry;

use thiserror::Error;

pub use openai::OpenAiClient;
pub use retry::{RetryError, RetryPolicy};

/// System framing sent ahead of every completion request.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a knowledgeable AI Alignment assistant. \
Do your best to answer the user's question, even if you don't know the answer for sure.";

/// Failure of a single call to the model service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limited by provider (HTTP {status})")]
    RateLimited { status: u16 },

    /// `body` is the start of the response body, which carries the provider's reason.
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Rate limiting is the only failure kind the provider retries.
    #[inline]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Sampling parameters for a completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 200,
        }
    }
}

/// Turns text into vectors and prompts into completions.
///
/// Inputs longer than the model's context window are the caller's problem; no
/// implementation truncates.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single string.
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>>;

    /// Embeds several strings, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>>;

    /// Answers `prompt` under [`ASSISTANT_SYSTEM_PROMPT`].
    fn complete(&self, prompt: &str, options: CompletionOptions) -> crate::Result<String>;
}
