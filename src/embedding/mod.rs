//! Embedding service — text to fixed-dimension unit vectors.
//!
//! [`Embedder`] wraps a pluggable backend ([`local`] deterministic hashing,
//! or the [`remote`] Gemini / OpenAI-compatible HTTP providers), normalizes
//! input whitespace, aligns every returned vector to the configured
//! dimension, and keeps a best-effort on-disk [`cache`].

pub mod cache;
pub mod local;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{EmbeddingConfig, GATEWAY_TOKEN_PREFIX};
use cache::EmbeddingCache;

/// Credential errors the bootstrap must distinguish from transport failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A gateway personal token was supplied where a direct provider key is
    /// required.
    #[error(
        "credential for {provider} looks like a gateway personal token \
         ('{GATEWAY_TOKEN_PREFIX}…'), not a direct provider API key"
    )]
    GatewayToken { provider: &'static str },
}

/// A backend computing raw, possibly misaligned embeddings for already
/// normalized text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Provider tag used in cache keys and logs.
    fn name(&self) -> &'static str;
}

/// The embedding service. Cheap to share behind an `Arc`.
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    model: String,
    dimension: usize,
    cache: Option<EmbeddingCache>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Embedder {
    /// Build from config. Provider selection: explicit configuration wins,
    /// otherwise inferred from which credentials are present, falling back
    /// to the local deterministic provider.
    pub fn from_config(config: &EmbeddingConfig, cache_path: Option<PathBuf>) -> Result<Self> {
        let provider = resolve_provider(config);
        let backend: Arc<dyn EmbeddingBackend> = match provider {
            "gemini" => {
                reject_gateway_token(&config.gemini_api_key, "gemini")?;
                Arc::new(remote::GeminiBackend::new(
                    &config.gemini_base_url,
                    &config.gemini_api_key,
                    &config.model,
                    config.dimension,
                ))
            }
            "openai-compatible" => {
                reject_gateway_token(&config.openai_api_key, "openai-compatible")?;
                Arc::new(remote::OpenAiCompatBackend::new(
                    &config.openai_base_url,
                    &config.openai_api_key,
                    &config.model,
                ))
            }
            _ => Arc::new(local::HashEmbeddingBackend::new(config.dimension)),
        };

        tracing::info!(provider, dimension = config.dimension, "embedding provider ready");

        let cache = cache_path.map(EmbeddingCache::open);
        Ok(Self {
            backend,
            model: config.model.clone(),
            dimension: config.dimension,
            cache,
        })
    }

    /// A cache-less local embedder of the given dimension.
    pub fn local(dimension: usize) -> Self {
        Self {
            backend: Arc::new(local::HashEmbeddingBackend::new(dimension)),
            model: String::new(),
            dimension,
            cache: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text. Whitespace is normalized before any processing or
    /// cache lookup; normalized-empty text yields an empty vector. The
    /// returned vector is always aligned to the configured dimension.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let key = cache::cache_key(self.backend.name(), &self.model, &normalized);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }

        let raw = self.backend.embed(&normalized).await?;
        let aligned = align(raw, self.dimension);

        // Cache writes are best-effort and isolated from the return path.
        if let Some(cache) = &self.cache {
            cache.put(key, aligned.clone());
        }

        Ok(aligned)
    }
}

/// Trim and collapse interior whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Align a vector to the target dimension by truncation or zero-padding.
/// The store assumes a fixed dimension, so this runs on every remote result.
pub fn align(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.resize(dimension, 0.0);
    vector
}

fn resolve_provider(config: &EmbeddingConfig) -> &'static str {
    match config.provider.as_str() {
        "gemini" => "gemini",
        "openai-compatible" => "openai-compatible",
        "local" => "local",
        _ => {
            if !config.gemini_api_key.is_empty() {
                "gemini"
            } else if !config.openai_api_key.is_empty() {
                "openai-compatible"
            } else {
                "local"
            }
        }
    }
}

fn reject_gateway_token(key: &str, provider: &'static str) -> Result<()> {
    if key.starts_with(GATEWAY_TOKEN_PREFIX) {
        return Err(CredentialError::GatewayToken { provider }.into());
    }
    Ok(())
}
