use axum::extract::State;

use crate::AppState;

/// `GET /metrics` — Prometheus exposition of the process counters and
/// gauges (`requests.allowed`, `requests.denied`, per-policy usage/limit).
pub async fn prometheus(State(state): State<AppState>) -> String {
    state.prometheus.render()
}
