//! Embeddings module: the text-embedding service behind the offline jobs
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **Gemini**: cloud embeddings via the Gemini API (768-dim), batched
//! - **ONNX**: local embeddings via `all-MiniLM-L6-v2` (384-dim)
//!
//! Bounded retry with back-off lives inside the Gemini client, per HTTP call;
//! the batch loops of the offline jobs never retry a failed batch.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Default Gemini embedding dimensions
pub const GEMINI_DIMENSIONS: usize = 768;

/// Default ONNX (all-MiniLM-L6-v2) embedding dimensions
pub const ONNX_DIMENSIONS: usize = 384;

/// Gemini rejects `batchEmbedContents` calls with more requests than this.
pub const GEMINI_MAX_BATCH: usize = 100;

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts, returning one vector per input in the same order.
    /// Any failure fails the whole batch. Defaults to calling `embed()` per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Returns the embedding dimension (e.g., 768 or 384).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Task type for embedding API. Only papers are ever embedded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    #[default]
    RetrievalDocument,
}

// ============================================================================
// Error types
// ============================================================================

/// Embedding generation errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Invalid response: sent {expected} texts, got {actual} embeddings")]
    BatchLength { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },

    #[error("ONNX model not found at {path}; download all-MiniLM-L6-v2 and its tokenizer.json there")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

// ============================================================================
// Config types
// ============================================================================

/// Gemini embedding client configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>, model: String, dimensions: usize) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            dimensions,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
}

/// Configuration union for the backend factory.
pub enum BackendConfig {
    Gemini(GeminiConfig),
    Onnx(OnnxConfig),
}

/// Create the appropriate backend from configuration.
pub fn create_backend(config: BackendConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    match config {
        BackendConfig::Gemini(c) => Ok(Box::new(GeminiEmbeddingClient::new(c)?)),
        BackendConfig::Onnx(c) => {
            Ok(Box::new(crate::onnx_embedder::OnnxEmbeddingClient::new(c)?))
        }
    }
}

/// Build the backend selected by `[embedding] backend` ("gemini" or "onnx").
pub fn backend_from_config(
    config: &crate::PaperRecConfig,
) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let embedding = &config.embedding;
    let backend_cfg = match embedding.backend.as_str() {
        "onnx" => {
            let (model_path, tokenizer_path) =
                crate::onnx_embedder::resolve_onnx_paths(&embedding.onnx_model_path);
            BackendConfig::Onnx(OnnxConfig {
                model_path,
                tokenizer_path,
                dimensions: embedding.onnx_dimensions as usize,
            })
        }
        _ => {
            // Default: "gemini"
            let mut gemini = GeminiConfig::new(
                None,
                embedding.gemini_model.clone(),
                embedding.gemini_dimensions as usize,
            );
            gemini.max_retries = embedding.max_retries;
            gemini.retry_delay_ms = embedding.retry_delay_ms;
            BackendConfig::Gemini(gemini)
        }
    };

    create_backend(backend_cfg)
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    model: String,
    content: GeminiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiBatchRequest {
    requests: Vec<GeminiRequest>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    embedding: GeminiEmbedding,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiEmbeddingClient
// ============================================================================

/// Gemini embedding client: calls the Gemini Embeddings API.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    config: GeminiConfig,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: GeminiConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(
            config,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
        )
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: GeminiConfig, base_url: String) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries)
    }

    fn request_for(&self, text: &str) -> GeminiRequest {
        GeminiRequest {
            model: format!("models/{}", self.config.model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            task_type: Some(TaskType::RetrievalDocument),
            output_dimensionality: Some(self.config.dimensions),
        }
    }

    /// Generate an embedding for the given text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let result = Retry::spawn(self.retry_strategy(), || self.embed_once(text)).await;
        result.map_err(|e| self.exhausted(e))
    }

    /// Embed up to `GEMINI_MAX_BATCH` texts in one `batchEmbedContents` call.
    pub async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let result = Retry::spawn(self.retry_strategy(), || self.batch_once(texts)).await;
        result.map_err(|e| self.exhausted(e))
    }

    fn exhausted(&self, e: EmbeddingError) -> EmbeddingError {
        tracing::error!(
            attempts = self.config.max_retries,
            error = %e,
            "All embedding retry attempts failed"
        );
        EmbeddingError::RetryExhausted {
            attempts: self.config.max_retries,
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&self.request_for(text))
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let gemini_response: GeminiResponse = response.json().await?;
        self.check_dimensions(gemini_response.embedding.values)
    }

    async fn batch_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GeminiBatchRequest {
            requests: texts.iter().map(|t| self.request_for(t)).collect(),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let response = Self::check_status(response).await?;

        let batch: GeminiBatchResponse = response.json().await?;
        if batch.embeddings.len() != texts.len() {
            return Err(EmbeddingError::BatchLength {
                expected: texts.len(),
                actual: batch.embeddings.len(),
            });
        }

        batch
            .embeddings
            .into_iter()
            .map(|e| self.check_dimensions(e.values))
            .collect()
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EmbeddingError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);

        let (code, message) = error_detail
            .map(|e| (e.code, e.message))
            .unwrap_or((status.as_u16(), error_body));

        tracing::error!(code = code, message = %message, "Gemini API error");

        Err(EmbeddingError::Api { code, message })
    }

    fn check_dimensions(&self, values: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::MissingEmbedding);
        }
        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(GEMINI_MAX_BATCH) {
            out.extend(self.embed_chunk(chunk).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
