//! Error taxonomy for the policy core.
//!
//! Library code returns [`Error`]; the binary wraps it in `anyhow` at the edges.
//! Every variant carries owned strings so a single backend failure can be cloned
//! into each slot of a batch result.

use std::path::PathBuf;

/// Convenience alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A required configuration value is missing or invalid. Fatal at startup.
    #[error("missing configuration \"{key}\": {reason}")]
    Config { key: String, reason: String },

    /// The policy directory (or, in strict mode, one of its files) could not be loaded.
    #[error("failed to load policies from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// Two documents resolved to the same policy identifier.
    #[error("duplicate policy id \"{id}\" in {} and {}", first.display(), second.display())]
    Conflict {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// The embedding backend failed (network, auth, quota, or malformed response).
    #[error("embedding backend error: {0}")]
    Backend(String),

    /// Caller input was rejected.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("policy not found: {0}")]
    NotFound(String),

    /// A match could not be computed. Distinct from an empty result set.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The repository has not finished initializing, or has been shut down.
    #[error("policy repository is not ready")]
    NotReady,

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}
