use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::alert_rules::list))
        .route("/", post(handlers::alert_rules::create))
        .route("/{id}", get(handlers::alert_rules::get_by_id))
        .route("/{id}", put(handlers::alert_rules::update))
        .route("/{id}", delete(handlers::alert_rules::delete))
        // Manual trigger: bypasses threshold and cooldown
        .route("/{id}/test", post(handlers::alert_rules::test_trigger))
}
