use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::ip_rules::list))
        .route("/", post(handlers::ip_rules::create))
        // Diagnostics: which rule governs an IP (optionally within a tenant)
        .route("/match/{ip}", get(handlers::ip_rules::match_ip))
        .route(
            "/match/{ip}/tenant/{tenant_id}",
            get(handlers::ip_rules::match_ip_for_tenant),
        )
        .route("/{id}", get(handlers::ip_rules::get_by_id))
        .route("/{id}", put(handlers::ip_rules::update))
        .route("/{id}", delete(handlers::ip_rules::delete))
}
