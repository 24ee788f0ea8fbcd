//! HTTP surface wiring the pool and the queue
//!
//! Endpoints:
//! - POST /generate-api-key — issue a credential from the pool
//! - POST /refresh-token    — retire/park the previous credential, issue next
//! - POST /usage-report     — account usage, return the quota verdict
//! - POST /queue-failed     — accept a failed request for queued recovery
//! - GET  /queue-status     — queue counts by status
//! - POST /mock-response    — synthetic degradation payload
//! - GET  /health           — pool + queue summary
//! - GET  /metrics          — Prometheus exposition

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use credential_pool::{Credential, CredentialPool, CredentialStatus, QuotaAction, predict_action};
use retry_queue::{ReplayPayload, RetryQueue};

use crate::error::ApiError;
use crate::mock::{MockRequest, generate_mock_payload};
use crate::rotation::dispose_previous_token;

/// Fallback cooldown when the quota forecast demands a switch but no reset
/// is scheduled yet.
const QUOTA_SIGNAL_COOLDOWN: Duration = Duration::from_secs(900);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<CredentialPool>,
    pub queue: Arc<RetryQueue>,
    pub prometheus: PrometheusHandle,
    pub default_provider: String,
    pub default_model: String,
}

/// Build the axum router with all routes and shared state.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/generate-api-key", post(generate_api_key))
        .route("/refresh-token", post(refresh_token))
        .route("/usage-report", post(usage_report))
        .route("/queue-failed", post(queue_failed))
        .route("/queue-status", get(queue_status))
        .route("/mock-response", post(mock_response))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct GenerateApiKeyRequest {
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

/// Credential fields echoed to callers. Never includes the reset schedule of
/// other credentials or any secret but the issued token itself.
#[derive(Debug, Serialize)]
struct IssuedCredential {
    token: String,
    credential_id: String,
    provider: String,
    model: String,
    status: &'static str,
    tier: &'static str,
    daily_call_limit: Option<u32>,
    used_calls: u32,
}

impl IssuedCredential {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            token: credential.api_key.clone(),
            credential_id: credential.id.clone(),
            provider: credential.provider.clone(),
            model: credential.model.clone(),
            status: credential.status.label(),
            tier: credential.tier.label(),
            daily_call_limit: credential.effective_call_limit(),
            used_calls: credential.used_calls,
        }
    }
}

async fn generate_api_key(
    State(state): State<AppState>,
    request: Option<Json<GenerateApiKeyRequest>>,
) -> Result<Json<IssuedCredential>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let provider = request.provider.unwrap_or_else(|| state.default_provider.clone());
    let model = request.model.unwrap_or_else(|| state.default_model.clone());

    let credential = state
        .pool
        .select_next(&provider, Some(&model))
        .await
        .ok_or_else(|| {
            ApiError::NoCredential(
                "No credentials available for requested provider/model.".to_string(),
            )
        })?;

    info!(
        credential_id = %credential.id,
        provider = %credential.provider,
        model = %credential.model,
        issued_for = request.user_id.as_deref().unwrap_or("anonymous"),
        via = "generate",
        "credential issued"
    );
    crate::metrics::record_credential_issued("generate");

    Ok(Json(IssuedCredential::from_credential(&credential)))
}

#[derive(Debug, Default, Deserialize)]
struct RefreshTokenRequest {
    #[serde(default)]
    previous_token: Option<String>,
    #[serde(default)]
    failure_status: Option<u16>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefreshTokenResponse {
    token: String,
    credential_id: String,
    action: &'static str,
    message: String,
}

async fn refresh_token(
    State(state): State<AppState>,
    request: Option<Json<RefreshTokenRequest>>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let previous = request.previous_token.unwrap_or_default();
    let (action, message) =
        dispose_previous_token(&state.pool, &previous, request.failure_status).await;

    let provider = request.provider.unwrap_or_else(|| state.default_provider.clone());
    let model = request.model.unwrap_or_else(|| state.default_model.clone());
    let credential = state
        .pool
        .select_next(&provider, Some(&model))
        .await
        .ok_or_else(|| {
            ApiError::NoCredential("No healthy credentials available for rotation.".to_string())
        })?;

    info!(
        credential_id = %credential.id,
        provider = %credential.provider,
        via = "refresh",
        action = action.label(),
        "credential issued"
    );
    crate::metrics::record_credential_issued("refresh");

    Ok(Json(RefreshTokenResponse {
        token: credential.api_key.clone(),
        credential_id: credential.id.clone(),
        action: action.label(),
        message,
    }))
}

#[derive(Debug, Deserialize)]
struct UsageReport {
    token: String,
    #[serde(default = "default_call_count")]
    call_count: u32,
    #[serde(default)]
    tokens_used: u64,
}

fn default_call_count() -> u32 {
    1
}

#[derive(Debug, Serialize)]
struct UsageVerdict {
    credential_id: String,
    action: &'static str,
    avg_calls_per_minute: f64,
    status: &'static str,
    used_calls: u32,
    used_tokens: u64,
}

/// Account reported usage and return the quota forecast.
///
/// A `switch` verdict marks the credential exhausted on the spot, with a
/// fallback cooldown when no reset is scheduled yet.
async fn usage_report(
    State(state): State<AppState>,
    Json(report): Json<UsageReport>,
) -> Result<Json<UsageVerdict>, ApiError> {
    let known = state
        .pool
        .lookup_by_token(&report.token)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;

    let credential = state
        .pool
        .record_usage(&known.id, report.call_count, report.tokens_used)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;
    let avg_calls = state.pool.observe_call(&credential.id).await;
    let action = predict_action(&credential, avg_calls);

    if action != QuotaAction::Allow {
        info!(
            credential_id = %credential.id,
            action = action.label(),
            avg_calls_per_minute = avg_calls,
            used_calls = credential.used_calls,
            "quota signal"
        );
    }

    let mut status = credential.status;
    if action == QuotaAction::Switch {
        let cooldown = credential.reset_at.is_none().then_some(QUOTA_SIGNAL_COOLDOWN);
        state
            .pool
            .mark_status(&credential.id, CredentialStatus::Exhausted, None, cooldown)
            .await;
        status = CredentialStatus::Exhausted;
    }

    Ok(Json(UsageVerdict {
        credential_id: credential.id.clone(),
        action: action.label(),
        avg_calls_per_minute: avg_calls,
        status: status.label(),
        used_calls: credential.used_calls,
        used_tokens: credential.used_tokens,
    }))
}

async fn queue_failed(
    State(state): State<AppState>,
    Json(payload): Json<ReplayPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let record = state.queue.enqueue(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "id": record.id })),
    ))
}

async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.snapshot().await)
}

async fn mock_response(Json(request): Json<MockRequest>) -> Json<Value> {
    let mock = generate_mock_payload(&request);
    let reason = request
        .reason
        .clone()
        .unwrap_or_else(|| "Provider outage; synthetic mock generated".to_string());
    Json(json!({
        "mock": mock,
        "degradation": "mocked",
        "reason": reason,
        "source": "llm-mock",
        "original_error": request.error,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let pool = state.pool.health().await;
    let queue = state.queue.snapshot().await;
    let status = pool["status"].clone();
    Json(json!({
        "status": status,
        "pool": pool,
        "queue": queue,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}
