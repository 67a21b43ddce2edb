use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

pub mod alert_rules;
pub mod api_keys;
mod health;
pub mod ip_rules;
pub mod policies;
pub mod policy_rules;
pub mod tenants;
pub mod user_policies;

/// Build all API routes, mounted under `/api` by the caller.
///
/// The check endpoint is the hot path — everything else is the management
/// plane. Both share one router and one state; there is no auth here
/// (admin authentication is terminated by the fronting gateway).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Hot path
        .route("/rate-limit/check", post(handlers::check::check))
        // Management plane
        .nest("/tenants", tenants::routes())
        .nest("/policies", policies::routes())
        .nest("/policy-rules", policy_rules::routes())
        .nest("/ip-rules", ip_rules::routes())
        .nest("/api-keys", api_keys::routes())
        .nest("/user-policies", user_policies::routes())
        .nest("/alert-rules", alert_rules::routes())
        // Probes
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::live_check))
}
