use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::Error;

/// Environment key holding the Azure OpenAI API key.
pub const ENV_API_KEY: &str = "PCheck_AOAI_APIKEY";
/// Environment key holding the Azure OpenAI resource endpoint.
pub const ENV_ENDPOINT: &str = "PCheck_AOAI_ENDPOINT";
/// Environment key holding the embedding model deployment name.
pub const ENV_DEPLOYMENT: &str = "PCheck_AOAI_EMBEDDINGDEPLOYMENTNAME";
pub const ENV_DATA_DIR: &str = "PCHECK_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "PCHECK_LOG_LEVEL";

/// Upper bound on adapter-level retries, whatever the config file asks for.
pub const MAX_EMBEDDING_RETRIES: u32 = 2;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub server: ServerConfig,
    pub policies: PoliciesConfig,
    pub embedding: EmbeddingConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoliciesConfig {
    pub data_dir: String,
    /// Abort the load on the first unparseable file instead of skipping it.
    pub strict_parsing: bool,
    /// Abort initialization on the first policy that fails to embed.
    pub strict_embedding: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    pub default_k: usize,
    pub max_k: usize,
    pub default_min_score: f64,
    pub query_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            log_level: "info".into(),
        }
    }
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            data_dir: "../../preloaded_policies/".into(),
            strict_parsing: false,
            strict_embedding: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: String::new(),
            deployment: String::new(),
            api_version: "2023-05-15".into(),
            batch_size: 16,
            max_retries: MAX_EMBEDDING_RETRIES,
            retry_backoff_ms: 250,
            request_timeout_secs: 30,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 50,
            default_min_score: 0.0,
            query_timeout_secs: 10,
        }
    }
}

impl EmbeddingConfig {
    /// Retries actually performed, clamped to [`MAX_EMBEDDING_RETRIES`].
    pub fn effective_retries(&self) -> u32 {
        self.max_retries.min(MAX_EMBEDDING_RETRIES)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl MatchingConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Returns `~/.pcheck/`
pub fn default_pcheck_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pcheck")
}

/// Returns the default config file path: `~/.pcheck/config.toml`
pub fn default_config_path() -> PathBuf {
    default_pcheck_dir().join("config.toml")
}

impl PolicyConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        let path = default_config_path();
        if path.exists() {
            return Self::load_from(path);
        }
        info!("no config file at {}, using defaults", path.display());
        let mut config = PolicyConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, then apply env var overrides. The file must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: PolicyConfig =
            toml::from_str(&contents).context("failed to parse config TOML")?;

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup. The process environment is the production lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(ENV_API_KEY) {
            self.embedding.api_key = val;
        }
        if let Some(val) = lookup(ENV_ENDPOINT) {
            self.embedding.endpoint = val;
        }
        if let Some(val) = lookup(ENV_DEPLOYMENT) {
            self.embedding.deployment = val;
        }
        if let Some(val) = lookup(ENV_DATA_DIR) {
            self.policies.data_dir = val;
        }
        if let Some(val) = lookup(ENV_LOG_LEVEL) {
            self.server.log_level = val;
        }
    }

    /// Check every required value, naming the first missing one.
    pub fn validate(&self) -> Result<(), Error> {
        require(ENV_API_KEY, &self.embedding.api_key)?;
        require(ENV_ENDPOINT, &self.embedding.endpoint)?;
        require(ENV_DEPLOYMENT, &self.embedding.deployment)?;
        require(ENV_DATA_DIR, &self.policies.data_dir)?;
        if self.embedding.batch_size == 0 {
            return Err(Error::config("embedding.batch_size", "must be at least 1"));
        }
        if self.matching.max_k == 0 {
            return Err(Error::config("matching.max_k", "must be at least 1"));
        }
        Ok(())
    }

    /// Resolve the policy data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.policies.data_dir)
    }
}

/// Fail with [`Error::Config`] when `value` is empty or whitespace.
pub fn require(key: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::config(key, "value is empty or not set"));
    }
    Ok(())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_config() -> PolicyConfig {
        let mut config = PolicyConfig::default();
        config.embedding.api_key = "key".into();
        config.embedding.endpoint = "https://example.openai.azure.com".into();
        config.embedding.deployment = "text-embedding-ada-002".into();
        config
    }

    #[test]
    fn default_config_values() {
        let config = PolicyConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.policies.data_dir, "../../preloaded_policies/");
        assert!(!config.policies.strict_parsing);
        assert_eq!(config.embedding.api_version, "2023-05-15");
        assert_eq!(config.matching.default_k, 5);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
port = 9000

[policies]
data_dir = "/srv/policies"
strict_parsing = true

[embedding]
api_key = "abc"
max_retries = 1
"#;
        let config: PolicyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.policies.data_dir, "/srv/policies");
        assert!(config.policies.strict_parsing);
        assert_eq!(config.embedding.api_key, "abc");
        assert_eq!(config.embedding.max_retries, 1);
        // defaults still apply for unset fields
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.embedding.batch_size, 16);
    }

    #[test]
    fn overrides_apply() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "env-key"),
            (ENV_ENDPOINT, "https://env.openai.azure.com"),
            (ENV_DEPLOYMENT, "env-deployment"),
            (ENV_DATA_DIR, "/tmp/policies"),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = PolicyConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.embedding.api_key, "env-key");
        assert_eq!(config.embedding.endpoint, "https://env.openai.azure.com");
        assert_eq!(config.embedding.deployment, "env-deployment");
        assert_eq!(config.policies.data_dir, "/tmp/policies");
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn validate_names_missing_key() {
        let err = PolicyConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == ENV_API_KEY));

        let mut config = complete_config();
        config.embedding.deployment = "   ".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == ENV_DEPLOYMENT));
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(complete_config().validate().is_ok());
    }

    #[test]
    fn retries_are_capped() {
        let mut config = EmbeddingConfig::default();
        config.max_retries = 10;
        assert_eq!(config.effective_retries(), MAX_EMBEDDING_RETRIES);
        config.max_retries = 0;
        assert_eq!(config.effective_retries(), 0);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = PolicyConfig::load_from(tmp.path().join("absent.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }

    #[test]
    fn load_from_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[matching]\nmax_k = 7\n").unwrap();
        let config = PolicyConfig::load_from(&path).unwrap();
        assert_eq!(config.matching.max_k, 7);
        assert_eq!(config.matching.default_k, 5);
    }
}
