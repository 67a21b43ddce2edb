use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::UserPolicy,
    services::UserPolicyService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListUserPoliciesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserPolicyInput {
    #[validate(length(min = 1, max = 255, message = "user_id must be 1-255 characters"))]
    pub user_id: String,
    pub tenant_id: Uuid,
    pub policy_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserPolicyInput {
    pub policy_id: Uuid,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListUserPoliciesQuery>,
) -> Result<Json<PaginatedResponse<UserPolicy>>, ApiError> {
    let service = UserPolicyService::new(state.db.clone());
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .clamp();

    let (mappings, total) = service.list(query.tenant_id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(mappings, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserPolicy>, ApiError> {
    let service = UserPolicyService::new(state.db.clone());
    let id = parse_uuid(&id)?;

    let mapping = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User policy not found".to_string()))?;
    Ok(Json(mapping))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateUserPolicyInput>,
) -> Result<Json<UserPolicy>, ApiError> {
    input.validate()?;

    let service = UserPolicyService::new(state.db.clone());
    let mapping = service
        .create(input.user_id.trim(), input.tenant_id, input.policy_id)
        .await?;
    Ok(Json(mapping))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateUserPolicyInput>,
) -> Result<Json<UserPolicy>, ApiError> {
    let service = UserPolicyService::new(state.db.clone());
    let id = parse_uuid(&id)?;

    let mapping = service.update(id, input.policy_id).await?;
    Ok(Json(mapping))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = UserPolicyService::new(state.db.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
