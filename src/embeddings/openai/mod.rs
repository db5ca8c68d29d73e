
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::embeddings::retry::RetryPolicy;
use crate::embeddings::{
    ASSISTANT_SYSTEM_PROMPT, CompletionOptions, EmbeddingProvider, ProviderError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

/// Blocking client for OpenAI-compatible embedding and chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    completion_model: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a, I: Serialize + ?Sized> {
    model: &'a str,
    input: &'a I,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &Config) -> crate::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| crate::SearchError::Config("missing OpenAI API key".to_string()))?;

        let base_url = config
            .openai
            .base_url()
            .map_err(|e| crate::SearchError::Config(e.to_string()))?;

        let timeout = if config.openai.timeout_secs == 0 {
            DEFAULT_TIMEOUT_SECONDS
        } else {
            config.openai.timeout_secs
        };

        Ok(Self {
            base_url,
            api_key,
            embedding_model: config.openai.embedding_model.clone(),
            completion_model: config.openai.completion_model.clone(),
            agent: build_agent(Duration::from_secs(timeout)),
            retry: config.retry.policy(),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Verify the credential by listing the models visible to it
    #[inline]
    pub fn health_check(&self) -> crate::Result<()> {
        let models = self.list_models()?;

        if !models.iter().any(|m| m.id == self.embedding_model) {
            debug!(
                "Embedding model {} not listed among {} models",
                self.embedding_model,
                models.len()
            );
        }

        info!(
            "Health check passed for {} ({} models visible)",
            self.base_url,
            models.len()
        );
        Ok(())
    }

    #[inline]
    pub fn list_models(&self) -> crate::Result<Vec<ModelInfo>> {
        let url = self.endpoint("models")?;
        debug!("Fetching available models from {}", url);

        let response = self
            .agent
            .get(url.as_str())
            .header("Authorization", self.bearer())
            .call();
        let response_text = read_response(response)?;

        let models: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(models.data)
    }

    fn endpoint(&self, path: &str) -> crate::Result<Url> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path)
            .map_err(|e| crate::SearchError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.trim())
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String, ProviderError> {
        let response = self
            .agent
            .post(url.as_str())
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json")
            .send(body);
        read_response(response)
    }

    fn request_embeddings<I>(&self, input: &I) -> crate::Result<Vec<EmbedData>>
    where
        I: Serialize + ?Sized,
    {
        let url = self.endpoint("embeddings")?;
        let request = EmbedRequest {
            model: &self.embedding_model,
            input,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| crate::SearchError::Other(anyhow::anyhow!(e)))?;

        let response_text = self
            .retry
            .run(ProviderError::is_rate_limit, || {
                self.post_json(&url, &request_json)
            })?;

        let mut response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        response.data.sort_by_key(|entry| entry.index);
        Ok(response.data)
    }
}

impl EmbeddingProvider for OpenAiClient {
    #[inline]
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let data = self.request_embeddings(text)?;
        let embedding = data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or(ProviderError::EmptyResponse)?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let data = self.request_embeddings(texts)?;
        if data.len() != texts.len() {
            return Err(ProviderError::Decode(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                data.len()
            ))
            .into());
        }

        Ok(data.into_iter().map(|entry| entry.embedding).collect())
    }

    #[inline]
    fn complete(&self, prompt: &str, options: CompletionOptions) -> crate::Result<String> {
        debug!(
            "Requesting completion from {} (max_tokens: {})",
            self.completion_model, options.max_tokens
        );

        let url = self.endpoint("chat/completions")?;
        let request = ChatRequest {
            model: &self.completion_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: ASSISTANT_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| crate::SearchError::Other(anyhow::anyhow!(e)))?;

        let response_text = self.post_json(&url, &request_json)?;
        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::EmptyResponse.into())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    // Error statuses are read like any other response so their bodies survive.
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

const MAX_ERROR_BODY_CHARS: usize = 512;

fn read_response(
    response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<String, ProviderError> {
    let mut response = response.map_err(|e| ProviderError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    check_status(status, body)
}

fn check_status(status: u16, body: String) -> Result<String, ProviderError> {
    match status {
        200..=299 => Ok(body),
        429 => Err(ProviderError::RateLimited { status }),
        _ => Err(ProviderError::Status {
            status,
            body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
        }),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", text.get(..end).unwrap_or(text)),
        None => text.to_string(),
    }
}
