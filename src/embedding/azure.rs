//! Azure OpenAI embedding provider.
//!
//! Implements [`EmbeddingProvider`] against the deployment-scoped embeddings endpoint:
//! `POST {endpoint}/openai/deployments/{deployment}/embeddings?api-version={version}`.
//! Transient failures (transport errors, HTTP 408/429/5xx) are retried at most
//! [`MAX_EMBEDDING_RETRIES`] times with exponential backoff. Nothing above this adapter retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{validate_text, EmbeddingProvider, EmbeddingVector};
use crate::config::{
    require, EmbeddingConfig, ENV_API_KEY, ENV_DEPLOYMENT, ENV_ENDPOINT, MAX_EMBEDDING_RETRIES,
};
use crate::error::{Error, Result};

/// Longest slice of an error response body carried into error messages.
const MAX_ERROR_DETAIL: usize = 200;

pub struct AzureOpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    deployment: String,
    max_retries: u32,
    backoff: Duration,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Outcome of a single HTTP attempt that did not succeed.
enum AttemptError {
    /// Worth retrying: the backend may recover.
    Transient(String),
    Fatal(Error),
}

impl AzureOpenAiEmbedder {
    /// Build with default tuning. Every argument must be non-empty.
    pub fn new(api_key: &str, endpoint: &str, deployment: &str) -> Result<Self> {
        Self::build(api_key, endpoint, deployment, &EmbeddingConfig::default())
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::build(&config.api_key, &config.endpoint, &config.deployment, config)
    }

    fn build(
        api_key: &str,
        endpoint: &str,
        deployment: &str,
        config: &EmbeddingConfig,
    ) -> Result<Self> {
        require(ENV_API_KEY, api_key)?;
        require(ENV_ENDPOINT, endpoint)?;
        require(ENV_DEPLOYMENT, deployment)?;

        let endpoint = endpoint.trim().trim_end_matches('/');
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(Error::config(ENV_ENDPOINT, "must be an http(s) URL"));
        }
        let deployment = deployment.trim();
        let url = format!(
            "{endpoint}/openai/deployments/{deployment}/embeddings?api-version={}",
            config.api_version
        );

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(ENV_ENDPOINT, format!("failed to build HTTP client: {e}")))?;

        tracing::info!(deployment = %deployment, endpoint = %endpoint, "Azure OpenAI embedder configured");

        Ok(Self {
            client,
            url,
            api_key: api_key.trim().to_string(),
            deployment: deployment.to_string(),
            max_retries: config.effective_retries(),
            backoff: config.retry_backoff(),
        })
    }

    /// Override the retry budget (clamped to [`MAX_EMBEDDING_RETRIES`]) and base backoff.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.min(MAX_EMBEDDING_RETRIES);
        self.backoff = backoff;
        self
    }

    /// Send one embeddings request, retrying transient failures within budget.
    async fn request(&self, inputs: &[&str]) -> Result<Vec<EmbeddingVector>> {
        let body = EmbeddingsRequest { input: inputs };
        let mut attempt = 0u32;
        loop {
            let failure = match self.send_once(&body, inputs.len()).await {
                Ok(vectors) => return Ok(vectors),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Transient(msg)) => msg,
            };

            if attempt >= self.max_retries {
                return Err(Error::Backend(format!(
                    "{failure} (gave up after {} attempt(s))",
                    attempt + 1
                )));
            }

            let delay = self.backoff * 2u32.pow(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "embedding request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        body: &EmbeddingsRequest<'_>,
        expected: usize,
    ) -> Result<Vec<EmbeddingVector>, AttemptError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = truncate(response.text().await.unwrap_or_default());
            return Err(match status.as_u16() {
                408 | 429 | 500..=599 => AttemptError::Transient(format!("HTTP {status}: {detail}")),
                400 => AttemptError::Fatal(Error::Validation(format!(
                    "embedding backend rejected input: {detail}"
                ))),
                401 | 403 => AttemptError::Fatal(Error::Backend(format!(
                    "authentication failed (HTTP {status})"
                ))),
                _ => AttemptError::Fatal(Error::Backend(format!("HTTP {status}: {detail}"))),
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            AttemptError::Fatal(Error::Backend(format!("malformed embeddings response: {e}")))
        })?;

        order_response(parsed, expected).map_err(AttemptError::Fatal)
    }
}

/// Reorder response items by `index` and check there is exactly one per input.
fn order_response(response: EmbeddingsResponse, expected: usize) -> Result<Vec<EmbeddingVector>> {
    if response.data.len() != expected {
        return Err(Error::Backend(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for datum in response.data {
        let slot = slots
            .get_mut(datum.index)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| {
                Error::Backend(format!(
                    "invalid or duplicate embedding index {}",
                    datum.index
                ))
            })?;
        *slot = Some(datum.embedding);
    }

    slots
        .into_iter()
        .map(|slot| {
            let values = slot.unwrap_or_default();
            EmbeddingVector::new(values)
                .map_err(|e| Error::Backend(format!("malformed embedding: {e}")))
        })
        .collect()
}

fn truncate(mut detail: String) -> String {
    if detail.len() > MAX_ERROR_DETAIL {
        let mut end = MAX_ERROR_DETAIL;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        detail.truncate(end);
        detail.push_str("...");
    }
    detail
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        validate_text(text)?;
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("empty embeddings response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<EmbeddingVector>> {
        let mut slots: Vec<Option<Result<EmbeddingVector>>> = vec![None; texts.len()];
        let mut pending_idx = Vec::new();
        let mut pending = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match validate_text(text) {
                Ok(()) => {
                    pending_idx.push(i);
                    pending.push(text.as_str());
                }
                Err(err) => slots[i] = Some(Err(err)),
            }
        }

        if !pending.is_empty() {
            match self.request(&pending).await {
                Ok(vectors) => {
                    for (i, vector) in pending_idx.iter().zip(vectors) {
                        slots[*i] = Some(Ok(vector));
                    }
                }
                // One bad input poisons the whole request; isolate it.
                Err(Error::Validation(reason)) if pending.len() > 1 => {
                    tracing::debug!(
                        batch = pending.len(),
                        reason = %reason,
                        "batch rejected, embedding inputs individually"
                    );
                    for (i, text) in pending_idx.iter().zip(&pending) {
                        slots[*i] = Some(self.embed(text).await);
                    }
                }
                Err(err) => {
                    for i in &pending_idx {
                        slots[*i] = Some(Err(err.clone()));
                    }
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(Error::Backend("missing batch result".into()))))
            .collect()
    }

    fn model(&self) -> &str {
        &self.deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_fail_fast() {
        let err = AzureOpenAiEmbedder::new("", "https://x.openai.azure.com", "ada").err();
        assert!(matches!(err, Some(Error::Config { ref key, .. }) if key == ENV_API_KEY));

        let err = AzureOpenAiEmbedder::new("k", "", "ada").err();
        assert!(matches!(err, Some(Error::Config { ref key, .. }) if key == ENV_ENDPOINT));

        let err = AzureOpenAiEmbedder::new("k", "https://x.openai.azure.com", " ").err();
        assert!(matches!(err, Some(Error::Config { ref key, .. }) if key == ENV_DEPLOYMENT));
    }

    #[test]
    fn endpoint_must_be_a_url() {
        let err = AzureOpenAiEmbedder::new("k", "x.openai.azure.com", "ada").err();
        assert!(matches!(err, Some(Error::Config { ref key, .. }) if key == ENV_ENDPOINT));
    }

    #[test]
    fn url_is_deployment_scoped() {
        let embedder =
            AzureOpenAiEmbedder::new("k", "https://x.openai.azure.com/", "ada-002").unwrap();
        assert_eq!(
            embedder.url,
            "https://x.openai.azure.com/openai/deployments/ada-002/embeddings?api-version=2023-05-15"
        );
        assert_eq!(embedder.model(), "ada-002");
    }

    #[test]
    fn retry_override_is_capped() {
        let embedder = AzureOpenAiEmbedder::new("k", "https://x.openai.azure.com", "ada")
            .unwrap()
            .with_retry(9, Duration::from_millis(1));
        assert_eq!(embedder.max_retries, MAX_EMBEDDING_RETRIES);
    }

    #[test]
    fn response_is_reordered_by_index() {
        let response = EmbeddingsResponse {
            data: vec![
                EmbeddingDatum { index: 1, embedding: vec![0.0, 1.0] },
                EmbeddingDatum { index: 0, embedding: vec![1.0, 0.0] },
            ],
        };
        let vectors = order_response(response, 2).unwrap();
        assert_eq!(vectors[0].as_slice(), &[1.0, 0.0]);
        assert_eq!(vectors[1].as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn response_with_wrong_count_or_index_is_backend_error() {
        let short = EmbeddingsResponse {
            data: vec![EmbeddingDatum { index: 0, embedding: vec![1.0] }],
        };
        assert!(matches!(order_response(short, 2), Err(Error::Backend(_))));

        let dup = EmbeddingsResponse {
            data: vec![
                EmbeddingDatum { index: 0, embedding: vec![1.0] },
                EmbeddingDatum { index: 0, embedding: vec![2.0] },
            ],
        };
        assert!(matches!(order_response(dup, 2), Err(Error::Backend(_))));
    }

    #[test]
    fn truncate_long_detail() {
        let detail = truncate("x".repeat(500));
        assert_eq!(detail.len(), MAX_ERROR_DETAIL + 3);
        assert!(detail.ends_with("..."));
        assert_eq!(truncate("short".into()), "short");
    }
}
