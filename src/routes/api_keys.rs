use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::api_keys::list))
        .route("/", post(handlers::api_keys::create))
        // Gateway helper: resolve a presented raw key
        .route("/verify", post(handlers::api_keys::verify))
        .route("/{id}", get(handlers::api_keys::get_by_id))
        .route("/{id}", put(handlers::api_keys::update))
        .route("/{id}", delete(handlers::api_keys::delete))
}
