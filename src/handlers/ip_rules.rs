use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{IpRule, IpRuleType},
    services::IpRuleService,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListIpRulesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateIpRuleInput {
    pub tenant_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub ip_cidr: Option<String>,
    pub rule_type: Option<IpRuleType>,
    pub policy_id: Option<Uuid>,
    #[validate(length(max = 1024, message = "description too long"))]
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateIpRuleInput {
    pub policy_id: Option<Uuid>,
    #[validate(length(max = 1024, message = "description too long"))]
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListIpRulesQuery>,
) -> Result<Json<PaginatedResponse<IpRule>>, ApiError> {
    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .clamp();

    let (rules, total) = service.list(query.tenant_id, page, limit).await?;
    Ok(Json(PaginatedResponse::new(rules, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IpRule>, ApiError> {
    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let rule = service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("IP rule not found".to_string()))?;
    Ok(Json(rule))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateIpRuleInput>,
) -> Result<Json<IpRule>, ApiError> {
    input.validate()?;

    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let rule = service
        .create(
            input.tenant_id,
            input.ip_address.as_deref(),
            input.ip_cidr.as_deref(),
            input.rule_type.unwrap_or(IpRuleType::RateLimit),
            input.policy_id,
            input.description.as_deref(),
            input.enabled.unwrap_or(true),
        )
        .await?;
    Ok(Json(rule))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateIpRuleInput>,
) -> Result<Json<IpRule>, ApiError> {
    input.validate()?;

    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    let rule = service
        .update(
            id,
            input.policy_id,
            input.description.as_deref(),
            input.enabled,
        )
        .await?;
    Ok(Json(rule))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let id = parse_uuid(&id)?;

    service.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /api/ip-rules/match/{ip}` — diagnostic: which rule governs this IP
/// at global scope.
pub async fn match_ip(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<Option<IpRule>>, ApiError> {
    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let rule = service.match_ip(&ip, None).await?;
    Ok(Json(rule))
}

/// `GET /api/ip-rules/match/{ip}/tenant/{tenant_id}` — same, tenant rules
/// consulted first.
pub async fn match_ip_for_tenant(
    State(state): State<AppState>,
    Path((ip, tenant_id)): Path<(String, String)>,
) -> Result<Json<Option<IpRule>>, ApiError> {
    let service = IpRuleService::new(state.db.clone(), state.caches.clone());
    let tenant_id = parse_uuid(&tenant_id)?;
    let rule = service.match_ip(&ip, Some(tenant_id)).await?;
    Ok(Json(rule))
}
