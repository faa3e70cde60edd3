pub mod matching;
pub mod repository;
pub mod similarity;
pub mod store;
pub mod types;

pub use matching::PolicyMatcher;
pub use repository::{PolicyRepository, RepositoryOptions, RepositoryState, RepositoryStatus};
pub use store::{DirectoryStore, LoadReport, PolicySource};
pub use types::{EmbeddingFailure, LoadWarning, Policy, SimilarityResult};
