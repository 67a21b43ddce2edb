use axum::{extract::State, Json};
use serde::Serialize;

use crate::{services::CacheStats, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    database: String,
    counter_store: String,
    counter_breaker_open: bool,
    config_breaker_open: bool,
    caches: CacheHealth,
}

#[derive(Serialize)]
pub struct CacheHealth {
    policies: CacheStats,
    policies_by_name: CacheStats,
    tenants: CacheStats,
    ip_rules: CacheStats,
    ip_resolutions: CacheStats,
    api_keys: CacheStats,
}

#[derive(Serialize)]
pub struct LiveResponse {
    status: String,
    version: String,
}

/// Lightweight liveness endpoint for container health checks. Avoids store
/// probes so periodic probe traffic stays quiet.
pub async fn live_check() -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    let redis_status = match redis::cmd("PING")
        .query_async::<String>(&mut state.redis.clone())
        .await
    {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
        counter_store: redis_status,
        counter_breaker_open: state.counter_breaker.is_open(),
        config_breaker_open: state.config_breaker.is_open(),
        caches: CacheHealth {
            policies: state.caches.policies.stats(),
            policies_by_name: state.caches.policies_by_name.stats(),
            tenants: state.caches.tenants.stats(),
            ip_rules: state.caches.ip_rules.stats(),
            ip_resolutions: state.caches.ip_resolutions.stats(),
            api_keys: state.caches.api_keys.stats(),
        },
    })
}
