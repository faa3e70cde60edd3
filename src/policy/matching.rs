//! Query orchestration: validate → embed → rank → filter.
//!
//! A backend failure becomes [`Error::ServiceUnavailable`], so callers can tell
//! "no policy matched" (`Ok` with an empty list) from "no match could be computed".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::MatchingConfig;
use crate::embedding::{validate_text, EmbeddingProvider, EmbeddingVector};
use crate::error::{Error, Result};
use crate::policy::repository::PolicyRepository;
use crate::policy::types::SimilarityResult;

pub struct PolicyMatcher {
    repository: Arc<PolicyRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    query_timeout: Duration,
    max_k: usize,
}

impl PolicyMatcher {
    pub fn new(repository: Arc<PolicyRepository>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let defaults = MatchingConfig::default();
        Self {
            repository,
            embedder,
            query_timeout: defaults.query_timeout(),
            max_k: defaults.max_k,
        }
    }

    /// Bound the query embedding time and the largest accepted `k`.
    pub fn with_limits(mut self, query_timeout: Duration, max_k: usize) -> Self {
        self.query_timeout = query_timeout;
        self.max_k = max_k.max(1);
        self
    }

    pub fn repository(&self) -> &Arc<PolicyRepository> {
        &self.repository
    }

    /// Up to `k` policies scoring at least `min_score` against `text`, best first.
    pub async fn match_policies(
        &self,
        text: &str,
        k: usize,
        min_score: f64,
    ) -> Result<Vec<SimilarityResult<'_>>> {
        self.match_policies_with_cancel(text, k, min_score, &CancellationToken::new())
            .await
    }

    /// As [`match_policies`](Self::match_policies), abandoning the query when `cancel` fires.
    ///
    /// Cancellation never touches the repository: a cancelled lazy initialization
    /// publishes nothing, and query embeddings are never stored.
    pub async fn match_policies_with_cancel(
        &self,
        text: &str,
        k: usize,
        min_score: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SimilarityResult<'_>>> {
        validate_text(text)?;
        if k == 0 || k > self.max_k {
            return Err(Error::Validation(format!(
                "k must be between 1 and {}",
                self.max_k
            )));
        }
        if !min_score.is_finite() {
            return Err(Error::Validation("min_score must be a finite number".into()));
        }

        until_cancelled(cancel, self.repository.initialize())
            .await
            .map_err(unavailable)?;

        let query = until_cancelled(cancel, self.embed_query(text))
            .await
            .map_err(unavailable)?;

        // The text was already validated, so a rejected query vector is a backend fault.
        let results = self.repository.nearest(&query, k).map_err(|err| match err {
            Error::Validation(reason) => {
                Error::ServiceUnavailable(format!("unusable query embedding: {reason}"))
            }
            other => other,
        })?;
        Ok(results
            .into_iter()
            .filter(|r| r.score >= min_score)
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector> {
        match tokio::time::timeout(self.query_timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(Error::ServiceUnavailable(format!(
                "query embedding timed out after {}ms",
                self.query_timeout.as_millis()
            ))),
        }
    }
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}

fn unavailable(err: Error) -> Error {
    match err {
        Error::Backend(reason) => Error::ServiceUnavailable(reason),
        other => other,
    }
}
