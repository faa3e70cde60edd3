//! The authoritative in-memory policy index.
//!
//! [`PolicyRepository::initialize`] loads every policy from its [`PolicySource`], embeds
//! them in batches, and publishes the finished index atomically. A `tokio::sync::OnceCell`
//! gives single-flight semantics. Concurrent callers wait for the in-flight pass, and a
//! failed or cancelled pass publishes nothing, so a later call can retry. Once published,
//! the index is immutable and every read is lock-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::PolicyConfig;
use crate::embedding::{EmbeddingProvider, EmbeddingVector};
use crate::error::{Error, Result};
use crate::policy::similarity::{check_dimensions, cosine_with_norms, nonzero_magnitude};
use crate::policy::store::{LoadReport, PolicySource};
use crate::policy::types::{EmbeddingFailure, LoadWarning, Policy, SimilarityResult};

/// Tuning for the embedding pass.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Abort initialization on the first policy that cannot be embedded.
    pub strict_embedding: bool,
    /// Texts per `embed_batch` call.
    pub batch_size: usize,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            strict_embedding: false,
            batch_size: 16,
        }
    }
}

impl RepositoryOptions {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            strict_embedding: config.policies.strict_embedding,
            batch_size: config.embedding.batch_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryState {
    Uninitialized,
    Ready,
    ShutDown,
}

/// Snapshot of repository health, for `doctor` and `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStatus {
    pub state: RepositoryState,
    pub source: String,
    pub model: String,
    pub policies: usize,
    pub embedded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized_at: Option<DateTime<Utc>>,
    pub warnings: Vec<LoadWarning>,
    pub embedding_failures: Vec<EmbeddingFailure>,
}

struct PolicyIndex {
    policies: Vec<Policy>,
    by_id: HashMap<String, usize>,
    /// Parallel to `policies`; `Some` exactly when the policy is embedded.
    norms: Vec<Option<f64>>,
    dimensions: Option<usize>,
    warnings: Vec<LoadWarning>,
    failures: Vec<EmbeddingFailure>,
    initialized_at: DateTime<Utc>,
}

pub struct PolicyRepository {
    source: Arc<dyn PolicySource>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: RepositoryOptions,
    index: OnceCell<PolicyIndex>,
    shut_down: AtomicBool,
}

impl PolicyRepository {
    pub fn new(
        source: Arc<dyn PolicySource>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: RepositoryOptions,
    ) -> Self {
        Self {
            source,
            embedder,
            options,
            index: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Load and embed every policy, at most once per repository.
    ///
    /// Returns immediately once the index is published. Callers arriving mid-pass
    /// wait for it rather than starting another.
    pub async fn initialize(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::NotReady);
        }
        self.index.get_or_try_init(|| self.build_index()).await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.index().is_ok()
    }

    /// Stop serving reads. Subsequent calls fail with [`Error::NotReady`].
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!(source = %self.source.describe(), "policy repository shut down");
        }
    }

    /// Every policy, in load order.
    pub fn all(&self) -> Result<&[Policy]> {
        Ok(&self.index()?.policies)
    }

    pub fn find_by_id(&self, id: &str) -> Result<&Policy> {
        let index = self.index()?;
        index
            .by_id
            .get(id)
            .map(|&i| &index.policies[i])
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// The `k` embedded policies most similar to `query`.
    ///
    /// Ordered by descending cosine similarity, ties broken by ascending id.
    /// Unembedded policies never appear.
    pub fn nearest(&self, query: &EmbeddingVector, k: usize) -> Result<Vec<SimilarityResult<'_>>> {
        let index = self.index()?;
        let query_norm = nonzero_magnitude(query.as_slice(), "query")?;
        if let Some(dimensions) = index.dimensions {
            check_dimensions(dimensions, query.dimensions())?;
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<SimilarityResult<'_>> = index
            .policies
            .iter()
            .zip(&index.norms)
            .filter_map(|(policy, norm)| {
                let embedding = policy.embedding.as_ref()?;
                Some(SimilarityResult {
                    policy,
                    score: cosine_with_norms(query.as_slice(), query_norm, embedding.as_slice(), (*norm)?),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.policy.id.cmp(&b.policy.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn status(&self) -> RepositoryStatus {
        let state = if self.shut_down.load(Ordering::Acquire) {
            RepositoryState::ShutDown
        } else if self.index.initialized() {
            RepositoryState::Ready
        } else {
            RepositoryState::Uninitialized
        };

        let mut status = RepositoryStatus {
            state,
            source: self.source.describe(),
            model: self.embedder.model().to_string(),
            policies: 0,
            embedded: 0,
            dimensions: None,
            initialized_at: None,
            warnings: Vec::new(),
            embedding_failures: Vec::new(),
        };

        if let Some(index) = self.index.get() {
            status.policies = index.policies.len();
            status.embedded = index.norms.iter().filter(|n| n.is_some()).count();
            status.dimensions = index.dimensions;
            status.initialized_at = Some(index.initialized_at);
            status.warnings = index.warnings.clone();
            status.embedding_failures = index.failures.clone();
        }
        status
    }

    fn index(&self) -> Result<&PolicyIndex> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::NotReady);
        }
        self.index.get().ok_or(Error::NotReady)
    }

    async fn build_index(&self) -> Result<PolicyIndex> {
        let source = Arc::clone(&self.source);
        let origin = source.describe();
        info!(source = %origin, model = %self.embedder.model(), "initializing policy repository");

        let LoadReport {
            mut policies,
            warnings,
        } = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(|e| Error::load(&origin, format!("load task failed: {e}")))??;

        // Embed outside any shared state; nothing is visible until the index is returned.
        let texts: Vec<String> = policies.iter().map(Policy::embedding_text).collect();
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.options.batch_size.max(1)) {
            let batch = self.embedder.embed_batch(chunk).await;
            if batch.len() != chunk.len() {
                return Err(Error::Backend(format!(
                    "provider returned {} embeddings for {} inputs",
                    batch.len(),
                    chunk.len()
                )));
            }
            results.extend(batch);
        }

        let mut dimensions = None;
        let mut norms = Vec::with_capacity(policies.len());
        let mut failures = Vec::new();
        for (policy, result) in policies.iter_mut().zip(results) {
            match result.and_then(|vector| accept(vector, &mut dimensions)) {
                Ok((vector, norm)) => {
                    policy.embedding = Some(vector);
                    norms.push(Some(norm));
                }
                Err(err) if self.options.strict_embedding => {
                    return Err(Error::Backend(format!(
                        "policy \"{}\" could not be embedded: {err}",
                        policy.id
                    )));
                }
                Err(err) => {
                    warn!(policy = %policy.id, error = %err, "policy left unembedded");
                    failures.push(EmbeddingFailure {
                        policy_id: policy.id.clone(),
                        reason: err.to_string(),
                    });
                    norms.push(None);
                }
            }
        }

        if dimensions.is_none() {
            let first = failures
                .first()
                .map(|f| f.reason.clone())
                .unwrap_or_default();
            return Err(Error::Backend(format!(
                "none of {} policies could be embedded: {first}",
                policies.len()
            )));
        }

        let by_id = policies
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();

        info!(
            policies = policies.len(),
            embedded = policies.len() - failures.len(),
            unembedded = failures.len(),
            skipped_files = warnings.len(),
            dimensions = dimensions.unwrap_or(0),
            "policy repository ready"
        );

        Ok(PolicyIndex {
            policies,
            by_id,
            norms,
            dimensions,
            warnings,
            failures,
            initialized_at: Utc::now(),
        })
    }
}

/// Admit a policy embedding: nonzero, and the same length as every vector before it.
/// The first admitted vector fixes the index dimensionality.
fn accept(vector: EmbeddingVector, dimensions: &mut Option<usize>) -> Result<(EmbeddingVector, f64)> {
    let norm = nonzero_magnitude(vector.as_slice(), "policy")?;
    match *dimensions {
        Some(expected) => check_dimensions(expected, vector.dimensions())?,
        None => *dimensions = Some(vector.dimensions()),
    }
    Ok((vector, norm))
}
