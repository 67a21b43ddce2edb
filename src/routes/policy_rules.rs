use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::policy_rules::list))
        .route("/", post(handlers::policy_rules::create))
        // Diagnostic: which rule wins for a path + method
        .route("/match", get(handlers::policy_rules::match_path))
        .route("/{id}", get(handlers::policy_rules::get_by_id))
        .route("/{id}", put(handlers::policy_rules::update))
        .route("/{id}", delete(handlers::policy_rules::delete))
}
