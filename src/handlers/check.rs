use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    limiter::CounterStore,
    models::Scope,
    services::rate_limit_service::{CheckContext, CheckOutcome},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identifier: String,
    pub scope: String,
    pub resource: Option<String>,
    pub method: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub policy_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub requested_tokens: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: i64,
    pub reset_in_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Uuid>,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

/// The hot path: `POST /api/rate-limit/check`.
///
/// Input errors (blank identifier, unknown scope, oversize identifier,
/// non-positive token request) are the only way this handler returns a
/// non-200 — counter-store trouble is absorbed into the policy's fail mode
/// by the service underneath.
pub async fn check(
    State(state): State<AppState>,
    Json(body): Json<CheckRequest>,
) -> Result<Response, ApiError> {
    let scope = Scope::parse(&body.scope)
        .ok_or_else(|| ApiError::InvalidInput(format!("unknown scope '{}'", body.scope)))?;

    let identifier = body.identifier.trim().to_string();
    CounterStore::validate_identifier(&identifier)?;

    let requested_tokens = body.requested_tokens.unwrap_or(1);
    if requested_tokens < 1 {
        return Err(ApiError::InvalidInput(
            "requested_tokens must be at least 1".to_string(),
        ));
    }

    let outcome = state
        .rate_limiter
        .check(CheckContext {
            identifier,
            scope,
            resource: body.resource,
            method: body.method,
            tenant_id: body.tenant_id,
            policy_id: body.policy_id,
            ip_address: body.ip_address,
            requested_tokens,
        })
        .await;

    Ok(respond(outcome))
}

fn respond(outcome: CheckOutcome) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("x-ratelimit-limit", int_header(outcome.limit));
    headers.insert("x-ratelimit-remaining", int_header(outcome.remaining));
    headers.insert("x-ratelimit-reset", int_header(outcome.reset_seconds));

    let body = CheckResponse {
        allowed: outcome.allowed,
        remaining: outcome.remaining,
        limit: outcome.limit,
        reset_in_seconds: outcome.reset_seconds,
        policy_id: outcome.policy_id,
        algorithm: outcome.algorithm,
        retry_after: outcome.retry_after,
    };

    (headers, Json(body)).into_response()
}

fn int_header(value: i64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("0"))
}
