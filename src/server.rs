//! HTTP API initialization and handlers.
//!
//! [`setup_shared_state`] wires the store, embedding provider, repository, and matcher;
//! [`serve_http`] initializes the repository before binding, so no request is ever
//! served against a partially loaded index.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use pcheck::config::PolicyConfig;
use pcheck::embedding::{self, EmbeddingProvider};
use pcheck::policy::{
    DirectoryStore, Policy, PolicyMatcher, PolicyRepository, PolicySource, RepositoryOptions,
    RepositoryStatus,
};
use pcheck::Error;

/// Everything a request handler or CLI command needs, shared by `Arc`.
#[derive(Clone)]
pub struct SharedState {
    pub repository: Arc<PolicyRepository>,
    pub matcher: Arc<PolicyMatcher>,
    pub config: Arc<PolicyConfig>,
}

/// Validate config, then build the store, embedding provider, repository, and matcher.
///
/// Nothing is loaded or embedded yet; call `repository.initialize()` next.
pub fn setup_shared_state(config: PolicyConfig) -> Result<SharedState> {
    config.validate().context("invalid configuration")?;

    let data_dir = config.resolved_data_dir();
    let source: Arc<dyn PolicySource> =
        Arc::new(DirectoryStore::new(&data_dir, config.policies.strict_parsing));

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to configure embedding provider")?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    tracing::info!(model = %embedder.model(), "embedding provider ready");

    let repository = Arc::new(PolicyRepository::new(
        source,
        Arc::clone(&embedder),
        RepositoryOptions::from_config(&config),
    ));
    let matcher = PolicyMatcher::new(Arc::clone(&repository), embedder)
        .with_limits(config.matching.query_timeout(), config.matching.max_k);

    Ok(SharedState {
        repository,
        matcher: Arc::new(matcher),
        config: Arc::new(config),
    })
}

/// Start the HTTP API and run until Ctrl-C.
pub async fn serve_http(config: PolicyConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = setup_shared_state(config)?;

    state
        .repository
        .initialize()
        .await
        .context("failed to initialize policy repository")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "policy API listening at http://{bind_addr}");

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.repository.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down policy API");
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/policies", get(list_policies))
        .route("/policies/match", post(match_policies))
        .route("/policies/{id}", get(get_policy))
        .with_state(state)
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicySummary {
    pub id: String,
    pub title: String,
    pub source: PathBuf,
    pub embedded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyDetail {
    #[serde(flatten)]
    pub summary: PolicySummary,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub text: String,
    pub k: Option<usize>,
    pub min_score: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyMatch {
    pub id: String,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<PolicyMatch>,
    pub total: usize,
}

impl From<&Policy> for PolicySummary {
    fn from(policy: &Policy) -> Self {
        Self {
            id: policy.id.clone(),
            title: policy.title.clone(),
            source: policy.source.clone(),
            embedded: policy.is_embedded(),
        }
    }
}

impl From<&Policy> for PolicyDetail {
    fn from(policy: &Policy) -> Self {
        Self {
            summary: PolicySummary::from(policy),
            body: policy.body.clone(),
            modified: policy.modified,
        }
    }
}

/// Maps the library error taxonomy onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ServiceUnavailable(_) | Error::NotReady | Error::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health(State(state): State<SharedState>) -> (StatusCode, Json<RepositoryStatus>) {
    let status = state.repository.status();
    let code = if state.repository.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn list_policies(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PolicySummary>>, ApiError> {
    let policies = state.repository.all()?;
    Ok(Json(policies.iter().map(PolicySummary::from).collect()))
}

async fn get_policy(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<PolicyDetail>, ApiError> {
    let policy = state.repository.find_by_id(&id)?;
    Ok(Json(PolicyDetail::from(policy)))
}

async fn match_policies(
    State(state): State<SharedState>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Result<Json<MatchResponse>, ApiError> {
    let Json(request) = payload?;
    let k = request.k.unwrap_or(state.config.matching.default_k);
    let min_score = request
        .min_score
        .unwrap_or(state.config.matching.default_min_score);

    tracing::info!(text_len = request.text.len(), k, min_score, "match requested");

    let results = state
        .matcher
        .match_policies(&request.text, k, min_score)
        .await?;

    let matches: Vec<PolicyMatch> = results
        .iter()
        .map(|r| PolicyMatch {
            id: r.policy.id.clone(),
            title: r.policy.title.clone(),
            score: r.score,
        })
        .collect();
    let total = matches.len();
    Ok(Json(MatchResponse { matches, total }))
}
