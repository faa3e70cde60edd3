#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pcheck::embedding::{validate_text, EmbeddingProvider, EmbeddingVector};
use pcheck::policy::{DirectoryStore, PolicyRepository, PolicySource, RepositoryOptions};
use pcheck::{Error, Result};
use tempfile::TempDir;

/// Deterministic embedder: returns the vector of the first registered keyword found in
/// the text. Counts every call, including rejected ones.
pub struct FakeEmbedder {
    fixtures: Vec<(String, Vec<f32>)>,
    failing: Vec<String>,
    delay: Duration,
    outage: AtomicBool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            fixtures: Vec::new(),
            failing: Vec::new(),
            delay: Duration::ZERO,
            outage: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, keyword: &str, vector: &[f32]) -> Self {
        self.fixtures.push((keyword.to_string(), vector.to_vec()));
        self
    }

    /// Any text containing `keyword` fails with a backend error.
    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing.push(keyword.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// While set, every call fails with a backend error.
    pub fn set_outage(&self, down: bool) {
        self.outage.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        validate_text(text)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.outage.load(Ordering::SeqCst) {
            return Err(Error::Backend("simulated outage".into()));
        }
        if let Some(keyword) = self.failing.iter().find(|k| text.contains(k.as_str())) {
            return Err(Error::Backend(format!("simulated failure for '{keyword}'")));
        }
        let (_, vector) = self
            .fixtures
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .ok_or_else(|| Error::Backend(format!("no fixture for text: {text}")))?;
        EmbeddingVector::new(vector.clone())
    }

    fn model(&self) -> &str {
        "fake"
    }
}

/// Write `(file name, contents)` pairs into a fresh temporary directory.
pub fn policy_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

/// Three policies whose bodies carry the keywords `alpha`, `beta`, `gamma`.
pub fn scenario_dir() -> TempDir {
    policy_dir(&[
        ("policy1.txt", "Policy One\nalpha rules apply."),
        ("policy2.txt", "Policy Two\nbeta rules apply."),
        ("policy3.txt", "Policy Three\ngamma rules apply."),
    ])
}

/// Embeds policy1 as [1,0], policy2 as [0,1], policy3 as [0.9,0.1].
/// Query texts containing `query-x` embed as [1,0].
pub fn scenario_embedder() -> FakeEmbedder {
    FakeEmbedder::new()
        .with("alpha", &[1.0, 0.0])
        .with("beta", &[0.0, 1.0])
        .with("gamma", &[0.9, 0.1])
        .with("query-x", &[1.0, 0.0])
}

pub fn repository(
    dir: &Path,
    embedder: Arc<FakeEmbedder>,
    options: RepositoryOptions,
) -> Arc<PolicyRepository> {
    let source: Arc<dyn PolicySource> = Arc::new(DirectoryStore::new(dir, false));
    let embedder: Arc<dyn EmbeddingProvider> = embedder;
    Arc::new(PolicyRepository::new(source, embedder, options))
}

pub fn vector(values: &[f32]) -> EmbeddingVector {
    EmbeddingVector::new(values.to_vec()).unwrap()
}
