use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::policies::list))
        .route("/", post(handlers::policies::create))
        .route("/{id}", get(handlers::policies::get_by_id))
        .route("/{id}", put(handlers::policies::update))
        .route("/{id}", delete(handlers::policies::delete))
        // Per-policy metrics over the event store
        .route("/{id}/metrics", get(handlers::policies::metrics_range))
        .route(
            "/{id}/metrics/summary",
            get(handlers::policies::metrics_summary),
        )
        .route("/{id}/events", get(handlers::policies::recent_events))
}
