//! Policy repository with embedding-based semantic matching.
//!
//! pcheck loads a folder of policy documents, embeds each one through an Azure OpenAI
//! embedding deployment, and answers "which policies does this text relate to?" by
//! cosine similarity.
//!
//! # Architecture
//!
//! - **Store**: one policy per `.md` / `.txt` / `.json` file, identifiers from filenames
//!   or an explicit `id` field, duplicate ids rejected
//! - **Embeddings**: [`embedding::EmbeddingProvider`] trait; Azure OpenAI adapter with
//!   bounded retries and per-input batch results
//! - **Repository**: single-flight initialization, then an immutable index shared
//!   lock-free across concurrent readers
//! - **Matching**: query validation, embedding, top-k ranking, score floor
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`embedding`]: text-to-vector capability and the Azure OpenAI adapter
//! - [`error`]: the error taxonomy shared by every operation
//! - [`policy`]: store, repository, similarity, and matching service

pub mod config;
pub mod embedding;
pub mod error;
pub mod policy;

pub use error::{Error, Result};
