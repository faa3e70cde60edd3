//! Text-to-vector embedding capability.
//!
//! Provides the [`EmbeddingProvider`] trait, the [`EmbeddingVector`] value type, and the
//! Azure OpenAI adapter in [`azure`]. The provider is created via [`create_provider`]
//! from configuration, which validates credentials eagerly.

pub mod azure;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// A non-empty vector of finite floats produced by an embedding model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw model output, rejecting empty vectors and NaN/infinite components.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::Validation("embedding vector is empty".into()));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::Validation(format!(
                "embedding component {pos} is not finite"
            )));
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Euclidean norm, accumulated in f64.
    pub fn magnitude(&self) -> f64 {
        crate::policy::similarity::magnitude(&self.0)
    }
}

/// Capability for embedding text into vectors.
///
/// Implementations may suspend on network I/O. Callers never hold repository
/// state across these calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Empty or whitespace-only text is a [`Error::Validation`].
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embed a batch, returning exactly one result per input in input order.
    ///
    /// A failure for one input does not discard the others.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await);
        }
        results
    }

    /// Model or deployment label, for logs and status reports.
    fn model(&self) -> &str;
}

/// Reject empty input before it reaches a backend.
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Validation("text must not be empty".into()));
    }
    Ok(())
}

/// Create the configured embedding provider.
///
/// Fails with [`Error::Config`] when a credential is missing, so misconfiguration
/// surfaces at startup rather than on the first request.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider = azure::AzureOpenAiEmbedder::from_config(config)?;
    Ok(Box::new(provider))
}
