use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::user_policies::list))
        .route("/", post(handlers::user_policies::create))
        .route("/{id}", get(handlers::user_policies::get_by_id))
        .route("/{id}", put(handlers::user_policies::update))
        .route("/{id}", delete(handlers::user_policies::delete))
}
