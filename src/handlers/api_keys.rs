use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{ApiKey, CreatedApiKey},
    services::ApiKeyService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListApiKeysQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyInput {
    pub tenant_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub policy_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateApiKeyInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub policy_id: Option<Uuid>,
    pub enabled: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyKeyInput {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyKeyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListApiKeysQuery>,
) -> Result<Json<PaginatedResponse<ApiKey>>, ApiError> {
    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .clamp();

    let (keys, total) = service.list(query.tenant_id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(keys, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiKey>, ApiError> {
    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let key = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("API key not found".to_string()))?;
    Ok(Json(key))
}

/// Create a key. The response is the only place the raw key ever appears.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateApiKeyInput>,
) -> Result<Json<CreatedApiKey>, ApiError> {
    input.validate()?;

    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());
    let created = service
        .create(
            input.tenant_id,
            input.name.trim(),
            input.policy_id,
            input.expires_at,
        )
        .await?;
    Ok(Json(created))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateApiKeyInput>,
) -> Result<Json<ApiKey>, ApiError> {
    input.validate()?;

    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let key = service
        .update(
            id,
            input.name.as_deref(),
            input.policy_id,
            input.enabled,
            input.expires_at,
        )
        .await?;
    Ok(Json(key))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `POST /api/api-keys/verify` — gateway helper: resolve a presented raw
/// key to its tenant/policy binding. Bumps `last_used_at` on success.
pub async fn verify(
    State(state): State<AppState>,
    Json(input): Json<VerifyKeyInput>,
) -> Result<Json<VerifyKeyResponse>, ApiError> {
    let service = ApiKeyService::new(state.db.clone(), state.caches.clone());

    let response = match service.verify(input.key.trim()).await? {
        Some(key) => VerifyKeyResponse {
            valid: true,
            tenant_id: Some(key.tenant_id),
            policy_id: key.policy_id,
            key_prefix: Some(key.key_prefix),
        },
        None => VerifyKeyResponse {
            valid: false,
            tenant_id: None,
            policy_id: None,
            key_prefix: None,
        },
    };
    Ok(Json(response))
}
