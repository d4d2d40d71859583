//! Embedding gateway abstraction and implementations.
//!
//! Defines the [`EmbeddingGateway`] trait and concrete implementations:
//! - **[`DisabledGateway`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAiGateway`]**: calls an OpenAI-compatible `POST {url}/embeddings`.
//! - **[`OllamaGateway`]**: calls a local Ollama instance's `POST {url}/api/embed`.
//!
//! Callers in the pipeline use [`EmbeddingGateway::embed`], which turns any
//! failure into an absent vector after logging it. A chunk without a vector is
//! simply not indexed.
//!
//! Also provides vector utilities for SQLite BLOB storage and similarity:
//! [`vec_to_blob`], [`blob_to_vec`] and [`cosine_similarity`].
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use kbase::config::EmbeddingConfig;
//! # use kbase::embedding::create_gateway;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let gateway = create_gateway(&config).unwrap();
//! assert_eq!(gateway.model_name(), "disabled");
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::http::{api_key_from_env, build_client, post_json_with_retry};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-ada-002"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed one text. Failures and wrong-sized vectors are logged and
    /// reported as `None`.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.try_embed(&[text.to_string()]).await {
            Ok(mut vectors) if vectors.len() == 1 => {
                let vector = vectors.remove(0);
                if vector.len() != self.dims() {
                    tracing::warn!(
                        model = self.model_name(),
                        expected = self.dims(),
                        got = vector.len(),
                        "embedding has unexpected dimensions"
                    );
                    return None;
                }
                Some(vector)
            }
            Ok(vectors) => {
                tracing::warn!(
                    model = self.model_name(),
                    count = vectors.len(),
                    "expected exactly one embedding"
                );
                None
            }
            Err(e) => {
                tracing::warn!(model = self.model_name(), error = %e, "embedding failed");
                None
            }
        }
    }
}

// ============ Disabled Gateway ============

/// Gateway used when `embedding.provider = "disabled"`. Every call fails.
pub struct DisabledGateway;

#[async_trait]
impl EmbeddingGateway for DisabledGateway {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn try_embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Gateway ============

pub struct OpenAiGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dims: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dims,
            max_retries,
        }
    }

    /// # Errors
    ///
    /// Fails when `model` is missing, or when the API key variable named by
    /// `api_key_env` is not set. `dims` falls back to 1536.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .resolved_dims()
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = api_key_from_env(&config.api_key_env)?;
        let base_url = config.url.as_deref().unwrap_or(DEFAULT_OPENAI_URL);

        Ok(Self::new(
            build_client(config.timeout_secs)?,
            base_url.trim_end_matches('/'),
            api_key,
            model,
            dims,
            config.max_retries,
        ))
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/embeddings", self.base_url);
        let response = post_json_with_retry(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&response)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(position as u64);
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Gateway ============

/// Gateway for a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dims: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            dims,
            max_retries,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let base_url = config.url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);

        Ok(Self::new(
            build_client(config.timeout_secs)?,
            base_url.trim_end_matches('/'),
            model,
            dims,
            config.max_retries,
        ))
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaGateway {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn try_embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.base_url);
        let response =
            post_json_with_retry(&self.client, &url, None, &body, self.max_retries, "Ollama")
                .await?;
        parse_ollama_response(&response)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Create the gateway named by `config.provider`.
///
/// | Config Value | Gateway |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledGateway`] |
/// | `"openai"` | [`OpenAiGateway`] |
/// | `"ollama"` | [`OllamaGateway`] |
pub fn create_gateway(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGateway)),
        "openai" => Ok(Arc::new(OpenAiGateway::from_config(config)?)),
        "ollama" => Ok(Arc::new(OllamaGateway::from_config(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a zero
/// vector.
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
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_basics() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_openai_response_sorted_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_openai_response(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_ollama_response() {
        let json = json!({"embeddings": [[0.5, 0.25]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.25]]);
        assert!(parse_ollama_response(&json!({"embeddings": [1.0]})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_gateway_yields_absent_vector() {
        let gateway = DisabledGateway;
        assert!(gateway.try_embed(&["x".to_string()]).await.is_err());
        assert_eq!(gateway.embed("x").await, None);
    }

    #[test]
    fn test_create_gateway_dispatch() {
        assert_eq!(
            create_gateway(&EmbeddingConfig::default()).unwrap().dims(),
            0
        );
        let ollama = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            ..Default::default()
        };
        assert_eq!(create_gateway(&ollama).unwrap().model_name(), "nomic-embed-text");

        let unknown = EmbeddingConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        assert!(create_gateway(&unknown).is_err());
    }
}
