//! Core policy type definitions.
//!
//! Defines [`Policy`] (one loaded document), [`SimilarityResult`] (a ranked match),
//! and the load-time diagnostics [`LoadWarning`] and [`EmbeddingFailure`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::EmbeddingVector;

/// A policy document held by the repository.
#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    /// Stable identifier: explicit `id` field, or the normalized filename stem.
    pub id: String,
    pub title: String,
    /// Full document text.
    pub body: String,
    /// File the policy was loaded from.
    pub source: PathBuf,
    /// Last modification time of the source file, when the filesystem reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Set once by the repository, all dimensions at once, or never.
    #[serde(skip)]
    pub(crate) embedding: Option<EmbeddingVector>,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            source: source.into(),
            modified: None,
            embedding: None,
        }
    }

    pub fn embedding(&self) -> Option<&EmbeddingVector> {
        self.embedding.as_ref()
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Text submitted to the embedding model: title, then body, unless the body
    /// already opens with the title.
    pub fn embedding_text(&self) -> String {
        let first_line = self
            .body
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("");
        if first_line.trim_start_matches('#').trim() == self.title {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// A policy paired with its cosine similarity to a query.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SimilarityResult<'a> {
    pub policy: &'a Policy,
    pub score: f64,
}

/// A file skipped during a non-strict load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadWarning {
    pub path: PathBuf,
    pub reason: String,
}

/// A policy that was retained but could not be embedded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingFailure {
    pub policy_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_text_prefixes_title_once() {
        let p = Policy::new("travel", "Travel", "Economy class only.", "travel.txt");
        assert_eq!(p.embedding_text(), "Travel\n\nEconomy class only.");

        let p = Policy::new("travel", "Travel", "# Travel\nEconomy class only.", "travel.md");
        assert_eq!(p.embedding_text(), "# Travel\nEconomy class only.");
    }

    #[test]
    fn new_policy_is_unembedded() {
        let p = Policy::new("a", "A", "body", "a.txt");
        assert!(!p.is_embedded());
        assert!(p.embedding().is_none());
    }
}
