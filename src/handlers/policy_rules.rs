use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::PolicyRule,
    services::policy_rule_service::RuleMatch,
    services::PolicyRuleService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListRulesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub policy_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleInput {
    pub policy_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 2048, message = "resource_pattern is required"))]
    pub resource_pattern: String,
    pub http_methods: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRuleInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub resource_pattern: Option<String>,
    pub http_methods: Option<String>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub path: String,
    pub method: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListRulesQuery>,
) -> Result<Json<PaginatedResponse<PolicyRule>>, ApiError> {
    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .clamp();

    let (rules, total) = service.list(query.policy_id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(rules, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PolicyRule>, ApiError> {
    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let rule = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Policy rule not found".to_string()))?;
    Ok(Json(rule))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateRuleInput>,
) -> Result<Json<PolicyRule>, ApiError> {
    input.validate()?;

    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let rule = service
        .create(
            input.policy_id,
            input.name.trim(),
            input.resource_pattern.trim(),
            input.http_methods.as_deref(),
            input.priority.unwrap_or(0),
            input.enabled.unwrap_or(true),
        )
        .await?;
    Ok(Json(rule))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateRuleInput>,
) -> Result<Json<PolicyRule>, ApiError> {
    input.validate()?;

    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let rule = service
        .update(
            id,
            input.name.as_deref(),
            input.resource_pattern.as_deref(),
            input.http_methods.as_deref(),
            input.priority,
            input.enabled,
        )
        .await?;
    Ok(Json(rule))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /api/policy-rules/match?path=&method=` — diagnostic: which rules
/// match and which wins.
pub async fn match_path(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<RuleMatch>, ApiError> {
    let service = PolicyRuleService::new(state.db.clone(), state.caches.clone());
    let result = service
        .match_path(&query.path, query.method.as_deref())
        .await?;
    Ok(Json(result))
}
