use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::tenants::list))
        .route("/", post(handlers::tenants::create))
        .route("/{id}", get(handlers::tenants::get_by_id))
        .route("/{id}", put(handlers::tenants::update))
        .route("/{id}", delete(handlers::tenants::delete))
}
