use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::ApiError,
    models::{AlertNotification, AlertRule},
    services::alert_service::AlertRuleStore,
    utils::pagination::{PageQuery, PaginatedResponse},
    utils::validation::parse_uuid,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlertRuleInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    /// Required: global (unbound) alert rules are not supported.
    pub policy_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "threshold_percentage must be 1-100"))]
    pub threshold_percentage: i32,
    pub window_seconds: Option<i64>,
    pub cooldown_seconds: Option<i64>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAlertRuleInput {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub threshold_percentage: Option<i32>,
    pub window_seconds: Option<i64>,
    pub cooldown_seconds: Option<i64>,
    pub enabled: Option<bool>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedResponse<AlertRule>>, ApiError> {
    let store = AlertRuleStore::new(&state.db);
    let (page, limit) = query.clamp();

    let (rules, total) = store.list(page, limit).await?;
    Ok(Json(PaginatedResponse::new(rules, total, page, limit)))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AlertRule>, ApiError> {
    let store = AlertRuleStore::new(&state.db);
    let id = parse_uuid(&id)?;

    let rule = store
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert rule not found".to_string()))?;
    Ok(Json(rule))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateAlertRuleInput>,
) -> Result<Json<AlertRule>, ApiError> {
    input.validate()?;

    let store = AlertRuleStore::new(&state.db);
    let rule = store
        .create(
            input.name.trim(),
            input.policy_id,
            input.threshold_percentage,
            input.window_seconds.unwrap_or(60),
            input.cooldown_seconds.unwrap_or(300),
            input.enabled.unwrap_or(true),
        )
        .await?;
    Ok(Json(rule))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateAlertRuleInput>,
) -> Result<Json<AlertRule>, ApiError> {
    input.validate()?;

    let store = AlertRuleStore::new(&state.db);
    let id = parse_uuid(&id)?;

    let rule = store
        .update(
            id,
            input.name.as_deref(),
            input.threshold_percentage,
            input.window_seconds,
            input.cooldown_seconds,
            input.enabled,
        )
        .await?;
    Ok(Json(rule))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = AlertRuleStore::new(&state.db);
    let id = parse_uuid(&id)?;

    store.delete(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// `POST /api/alert-rules/{id}/test` — fire the rule's notifiers now,
/// ignoring threshold and cooldown.
pub async fn test_trigger(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AlertNotification>, ApiError> {
    let id = parse_uuid(&id)?;
    let notification = state.alerts.test_trigger(id).await?;
    Ok(Json(notification))
}
