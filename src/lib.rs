use std::sync::Arc;

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod limiter;
pub mod models;
pub mod notifier;
pub mod resilience;
pub mod routes;
pub mod services;
pub mod utils;

use config::Settings;
use metrics_exporter_prometheus::PrometheusHandle;
use resilience::CircuitBreaker;
use services::{AlertService, ConfigCaches, MetricsService, RateLimitService};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub redis: redis::aio::ConnectionManager,
    pub settings: Arc<Settings>,
    pub caches: Arc<ConfigCaches>,
    pub rate_limiter: Arc<RateLimitService>,
    pub alerts: Arc<AlertService>,
    pub metrics: MetricsService,
    pub prometheus: PrometheusHandle,
    pub counter_breaker: Arc<CircuitBreaker>,
    pub config_breaker: Arc<CircuitBreaker>,
}
