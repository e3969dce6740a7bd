//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible embeddings API with
//!   batching, retry, and backoff.
//!
//! Also provides vector utilities for the SQLite-backed index:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes for BLOB storage
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//!
//! # Batching
//!
//! [`embed_texts`] slices its input into `batch_size` groups purely as a
//! throughput optimization; results always come back in input order with
//! one vector per input text.
//!
//! # Dimension Checking
//!
//! Every vector returned by the API is checked against the configured
//! `embedding.dims`. A mismatch means the configuration points at a
//! different model than the server is running, and continuing would write
//! corrupted vectors — [`verify_dimension`] runs a one-text probe so
//! embedding-dependent paths can abort at startup instead.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::text::{chunk_text, normalize_text};

/// Trait for embedding providers.
///
/// Defines the metadata interface all embedding backends implement. The
/// actual embedding computation is performed by [`embed_texts`] (kept as
/// a free function due to async trait limitations).
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider.
///
/// Returns one vector per input text, in input order. Inputs are
/// normalized ([`normalize_text`]) before being sent to the model.
///
/// # Errors
///
/// - `"disabled"` provider: always returns an error.
/// - `"openai"` provider: missing API key, a non-retryable API error,
///   exhausted retries, or a vector whose length differs from the
///   configured `dims`.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => {
            let mut vectors = Vec::with_capacity(texts.len());
            for batch in texts.chunks(config.batch_size.max(1)) {
                let normalized: Vec<String> =
                    batch.iter().map(|t| normalize_text(t)).collect();
                let batch_vectors = embed_openai(config, &normalized).await?;
                if batch_vectors.len() != batch.len() {
                    bail!(
                        "Embedding API returned {} vectors for {} inputs",
                        batch_vectors.len(),
                        batch.len()
                    );
                }
                vectors.extend(batch_vectors);
            }
            check_dims(config, &vectors)?;
            Ok(vectors)
        }
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text.
///
/// Convenience wrapper around [`embed_texts`] for single-text use cases
/// (e.g. embedding a search query).
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Chunk a document body and embed every chunk.
///
/// Returns `(chunk_text, vector)` pairs in chunk order. Empty or
/// whitespace-only input yields an empty sequence without touching the
/// API.
pub async fn chunk_and_embed(
    config: &EmbeddingConfig,
    chunking: &ChunkingConfig,
    body: &str,
) -> Result<Vec<(String, Vec<f32>)>> {
    let chunks = chunk_text(body, chunking.chunk_size, chunking.overlap)?;
    if chunks.is_empty() {
        return Ok(vec![]);
    }

    let vectors = embed_texts(config, &chunks).await?;
    Ok(chunks.into_iter().zip(vectors).collect())
}

/// Probe the embedding backend once and fail if its output dimension
/// differs from the configured `dims`.
///
/// Called at the start of any embedding-dependent path (ingestion runs,
/// server startup) so a misconfigured model aborts before any corrupted
/// vector reaches the index.
pub async fn verify_dimension(config: &EmbeddingConfig) -> Result<()> {
    let probe = embed_query(config, "dimension probe").await?;
    let expected = config.dims.unwrap_or(0);
    if probe.len() != expected {
        bail!(
            "Embedding dimension mismatch: configured dims = {}, model '{}' returned {}",
            expected,
            config.model.as_deref().unwrap_or("?"),
            probe.len()
        );
    }
    Ok(())
}

fn check_dims(config: &EmbeddingConfig, vectors: &[Vec<f32>]) -> Result<()> {
    let expected = config.dims.unwrap_or(0);
    for v in vectors {
        if v.len() != expected {
            bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                expected,
                v.len()
            );
        }
    }
    Ok(())
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for an OpenAI-compatible embeddings API.
///
/// Calls `POST {api_base}/embeddings` with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    /// Create a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for openai provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Call the embeddings API with retry/backoff.
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let url = format!("{}/embeddings", config.api_base.trim_end_matches('/'));
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_embeddings_response(&json);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "Embedding API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("Embedding API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

/// Parse the embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays in index order.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        indexed.push((index, vec));
    }

    // The API is free to return entries out of order; restore input order
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_response_restores_index_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.5, 0.5] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vectors = parse_embeddings_response(&json).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.5, 0.5]);
    }

    #[test]
    fn test_parse_response_rejects_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_embeddings_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let config = EmbeddingConfig::default();
        let result = embed_texts(&config, &["hello".to_string()]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_chunk_and_embed_empty_input() {
        // Empty input short-circuits before the provider is consulted,
        // so even the disabled provider yields an empty Ok.
        let config = EmbeddingConfig::default();
        let chunking = ChunkingConfig::default();
        let pairs = chunk_and_embed(&config, &chunking, "   ").await.unwrap();
        assert!(pairs.is_empty());
    }
}
