//! Embedding generation for search terms.
//!
//! Defines the [`EmbeddingProvider`] trait the engine depends on, the
//! concrete providers, and [`generate_embedding`], which turns search terms
//! into one validated query vector:
//!
//! 1. Validate the terms and options.
//! 2. Join the trimmed terms with single spaces.
//! 3. Call the provider once, retrying transient failures with backoff.
//! 4. Check the returned vector has exactly 1536 dimensions.
//!
//! # Providers
//!
//! - **[`DisabledProvider`]** fails every request; used when embeddings are
//!   not configured.
//! - **[`OpenAIProvider`]** calls the OpenAI embeddings API.
//!
//! # Retry Strategy
//!
//! Providers classify failures as [`ProviderError::Transient`] or
//! [`ProviderError::Fatal`]. Only transient failures are retried, up to
//! `max_retries` times after the first attempt:
//! - HTTP 429 (rate limited) and 5xx (server error) → transient
//! - HTTP 4xx (client error, not 429) → fatal
//! - Network errors → transient
//! - Backoff: `initial_backoff × 2^(attempt-1)`, exponent capped at 5
//!
//! # Cancellation
//!
//! A [`CancellationToken`](tokio_util::sync::CancellationToken) in
//! [`EmbeddingOptions`] aborts both an in-flight provider call and a pending
//! backoff sleep.

use anyhow::anyhow;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{ErrorKind, Result, StoredValuesError};
use crate::validate::{validate_embedding, validate_search_terms, EmbeddingOptions};

/// Failure reported by an [`EmbeddingProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Worth retrying: rate limits, server errors, network failures.
    #[error("{0:#}")]
    Transient(anyhow::Error),
    /// Retrying cannot help: bad request, auth failure, malformed response.
    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// An external text-embedding model.
///
/// `embed` performs exactly one attempt; retries and cancellation are
/// handled by [`generate_embedding`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embeds one text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;
}

/// Generates one query embedding from `terms`.
pub async fn generate_embedding(
    provider: &dyn EmbeddingProvider,
    terms: &[String],
    options: &EmbeddingOptions,
) -> Result<Vec<f32>> {
    let context = "Failed to generate embedding";
    let terms = validate_search_terms(terms).map_err(|e| e.context(context))?;
    options.validate().map_err(|e| e.context(context))?;

    let text = terms.join(" ");
    let vector = embed_with_retry(provider, &text, options).await?;

    let embedding = validate_embedding(&vector).map_err(|e| {
        StoredValuesError::wrap(ErrorKind::Embedding, context, e)
    })?;
    Ok(embedding.into_inner())
}

async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    text: &str,
    options: &EmbeddingOptions,
) -> Result<Vec<f32>> {
    let context = "Failed to generate embedding";
    let cancelled =
        || StoredValuesError::cancelled(format!("{}: request was cancelled", context));

    for attempt in 0..=options.max_retries {
        if attempt > 0 {
            let delay = backoff_delay(options.initial_backoff, attempt);
            info!(
                model = provider.model_name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying embedding request"
            );
            match &options.cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        debug!(
            model = provider.model_name(),
            attempt,
            chars = text.len(),
            "requesting embedding"
        );
        let outcome = match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(cancelled()),
                    outcome = provider.embed(text) => outcome,
                }
            }
            None => provider.embed(text).await,
        };

        match outcome {
            Ok(vector) => return Ok(vector),
            Err(e) if e.is_transient() && attempt < options.max_retries => {
                debug!(error = %e, attempt, "transient embedding failure");
            }
            Err(e) => return Err(StoredValuesError::wrap(ErrorKind::Embedding, context, e)),
        }
    }

    // The loop always returns on its last attempt.
    Err(StoredValuesError::new(
        ErrorKind::Embedding,
        format!("{}: retries exhausted", context),
    ))
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial * (1u32 << (attempt - 1).min(5))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always fails.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Fatal(anyhow!("Embedding provider is disabled")))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST {base_url}/embeddings` with the configured model. Requires
/// the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not set or the HTTP client
    /// cannot be built.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.into()))?;

        let status = response.status();
        if status.is_success() {
            let json: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ProviderError::Transient(e.into()))?;
            return parse_openai_response(&json).map_err(ProviderError::Fatal);
        }

        let body_text = response.text().await.unwrap_or_default();
        let err = anyhow!("OpenAI API error {}: {}", status, body_text);
        if status.as_u16() == 429 || status.is_server_error() {
            Err(ProviderError::Transient(err))
        } else {
            Err(ProviderError::Fatal(err))
        }
    }
}

/// Extracts `data[0].embedding` from an OpenAI embeddings response.
fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data[0].embedding"))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid OpenAI response: non-numeric embedding value"))
        })
        .collect()
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}
