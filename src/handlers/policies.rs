use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{Algorithm, FailMode, Policy, Scope},
    services::metrics_service::{MetricsRange, MetricsSummary},
    services::policy_service::{NewPolicy, PolicyPatch},
    services::PolicyService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::{parse_uuid, resolve_metrics_window},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListPoliciesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePolicyInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub tenant_id: Option<Uuid>,
    pub scope: Scope,
    pub algorithm: Algorithm,
    #[validate(range(min = 1, message = "max_requests must be positive"))]
    pub max_requests: i64,
    #[validate(range(min = 1, message = "window_seconds must be positive"))]
    pub window_seconds: i64,
    pub burst_capacity: Option<i64>,
    pub refill_rate: Option<f64>,
    pub fail_mode: Option<FailMode>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePolicyInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub max_requests: Option<i64>,
    pub window_seconds: Option<i64>,
    pub burst_capacity: Option<i64>,
    pub refill_rate: Option<f64>,
    pub fail_mode: Option<FailMode>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RecentEventsQuery {
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<Json<PaginatedResponse<Policy>>, ApiError> {
    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .clamp();

    let (policies, total) = service.list(query.tenant_id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(policies, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Policy>, ApiError> {
    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let policy = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Policy not found".to_string()))?;
    Ok(Json(policy))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreatePolicyInput>,
) -> Result<Json<Policy>, ApiError> {
    input.validate()?;

    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    let policy = service
        .create(NewPolicy {
            tenant_id: input.tenant_id,
            name: input.name.trim().to_string(),
            scope: input.scope,
            algorithm: input.algorithm,
            max_requests: input.max_requests,
            window_seconds: input.window_seconds,
            burst_capacity: input.burst_capacity,
            refill_rate: input.refill_rate,
            fail_mode: input.fail_mode.unwrap_or(FailMode::FailClosed),
            enabled: input.enabled.unwrap_or(true),
            is_default: input.is_default.unwrap_or(false),
        })
        .await?;
    Ok(Json(policy))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdatePolicyInput>,
) -> Result<Json<Policy>, ApiError> {
    input.validate()?;

    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let policy = service
        .update(
            id,
            PolicyPatch {
                name: input.name.map(|n| n.trim().to_string()),
                max_requests: input.max_requests,
                window_seconds: input.window_seconds,
                burst_capacity: input.burst_capacity,
                refill_rate: input.refill_rate,
                fail_mode: input.fail_mode,
                enabled: input.enabled,
                is_default: input.is_default,
            },
        )
        .await?;
    Ok(Json(policy))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /api/policies/{id}/metrics?from=&to=` — deny-rate aggregates over a
/// bounded window (default last 24h, max 90 days).
pub async fn metrics_range(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<MetricsRange>, ApiError> {
    let id = parse_uuid(&id)?;
    let (from, to) = resolve_metrics_window(query.from, query.to)?;

    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Policy not found".to_string()))?;

    let range = state.metrics.metrics_range(id, from, to).await?;
    Ok(Json(range))
}

/// `GET /api/policies/{id}/metrics/summary` — lifetime totals plus the
/// per-identifier-type breakdown.
pub async fn metrics_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MetricsSummary>, ApiError> {
    let id = parse_uuid(&id)?;

    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Policy not found".to_string()))?;

    let summary = state.metrics.summary(id).await?;
    Ok(Json(summary))
}

/// `GET /api/policies/{id}/events?limit=` — newest decisions for the
/// policy, for debugging limit behavior. Capped at 200 rows.
pub async fn recent_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RecentEventsQuery>,
) -> Result<Json<Vec<crate::models::RateLimitEvent>>, ApiError> {
    let id = parse_uuid(&id)?;

    let service = PolicyService::new(state.db.clone(), state.caches.clone());
    service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Policy not found".to_string()))?;

    let events = state
        .metrics
        .recent_events(id, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(events))
}
