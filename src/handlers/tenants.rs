use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{Tenant, TenantTier},
    services::TenantService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub tier: Option<TenantTier>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub tier: Option<TenantTier>,
    pub enabled: Option<bool>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<Tenant>>, ApiError> {
    let service = TenantService::new(state.db.clone(), state.caches.clone());
    let (page, limit) = query.clamp();

    let (tenants, total) = service.list(page, limit).await?;
    Ok(Json(PaginatedResponse::new(tenants, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Tenant>, ApiError> {
    let service = TenantService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let tenant = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".to_string()))?;
    Ok(Json(tenant))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateTenantInput>,
) -> Result<Json<Tenant>, ApiError> {
    input.validate()?;

    let service = TenantService::new(state.db.clone(), state.caches.clone());
    let tenant = service
        .create(
            input.name.trim(),
            input.tier.unwrap_or(TenantTier::Free),
            input.enabled.unwrap_or(true),
        )
        .await?;
    Ok(Json(tenant))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateTenantInput>,
) -> Result<Json<Tenant>, ApiError> {
    input.validate()?;

    let service = TenantService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let tenant = service
        .update(id, input.name.as_deref(), input.tier, input.enabled)
        .await?;
    Ok(Json(tenant))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = TenantService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
