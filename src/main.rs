use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratekeeper::config::Settings;
use ratekeeper::events::EventIngest;
use ratekeeper::limiter::{CounterStore, PolicyResolver};
use ratekeeper::notifier::{Notifier, SlackNotifier, WebhookNotifier};
use ratekeeper::resilience::{BreakerConfig, CircuitBreaker, StoreGuard};
use ratekeeper::services::{AlertService, ConfigCaches, MetricsService, RateLimitService};
use ratekeeper::{handlers, routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratekeeper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Arc::new(Settings::new()?);

    tracing::info!("Starting rate-limiting service...");

    // Config store connection pool
    let db = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    tracing::info!("Database connection established");

    ratekeeper::config::database::init_tables(&db)
        .await
        .expect("Failed to initialize database tables");

    // Counter store connection
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    let redis = redis_client.get_connection_manager().await?;

    tracing::info!("Counter store connection established");

    // Process metrics recorder (rendered at /metrics)
    let prometheus = PrometheusBuilder::new().install_recorder()?;

    // Config caches + circuit breakers
    let caches = Arc::new(ConfigCaches::new(&settings.cache));

    let counter_breaker = Arc::new(CircuitBreaker::new(
        "counter-store",
        BreakerConfig {
            window_size: settings.breakers.window_size,
            minimum_calls: settings.breakers.minimum_calls,
            failure_rate_threshold: settings.breakers.failure_rate_threshold,
            open_duration: Duration::from_secs(settings.breakers.counter_open_secs),
            half_open_permitted_calls: settings.breakers.half_open_permitted_calls,
        },
    ));
    let config_breaker = Arc::new(CircuitBreaker::new(
        "config-store",
        BreakerConfig {
            window_size: settings.breakers.window_size,
            minimum_calls: settings.breakers.minimum_calls,
            failure_rate_threshold: settings.breakers.failure_rate_threshold,
            open_duration: Duration::from_secs(settings.breakers.config_open_secs),
            half_open_permitted_calls: settings.breakers.half_open_permitted_calls,
        },
    ));

    // The counter adapter enforces its own per-call timeout; the config
    // guard wraps queries with the longer config-store timeout.
    let counter_guard = StoreGuard::new(counter_breaker.clone(), None);
    let config_guard = StoreGuard::new(
        config_breaker.clone(),
        Some(Duration::from_millis(settings.breakers.config_store_timeout_ms)),
    );

    let store = CounterStore::new(
        redis.clone(),
        Duration::from_millis(settings.counter.call_timeout_ms),
    );
    let resolver = Arc::new(PolicyResolver::new(
        db.clone(),
        caches.clone(),
        config_guard,
    ));

    // Async event pipeline
    let ingest = EventIngest::spawn(db.clone(), &settings.ingest);

    let rate_limiter = Arc::new(RateLimitService::new(
        resolver,
        store,
        counter_guard,
        ingest,
        &settings.counter,
    ));

    let metrics = MetricsService::new(db.clone());

    // Alerting engine + notifiers
    let notifiers: Vec<Box<dyn Notifier>> = vec![
        Box::new(SlackNotifier::new(
            settings.alerting.slack_webhook_url.clone(),
        )?),
        Box::new(WebhookNotifier::new(settings.alerting.webhook_url.clone())?),
    ];
    let alerts = Arc::new(AlertService::new(
        db.clone(),
        metrics.clone(),
        notifiers,
        &settings.alerting,
    ));
    AlertService::spawn_scheduler(alerts.clone());

    tracing::info!(
        "Alerting {} (interval {}s)",
        if settings.alerting.enabled {
            "enabled"
        } else {
            "disabled"
        },
        settings.alerting.check_interval_secs
    );

    let state = AppState {
        db,
        redis,
        settings: settings.clone(),
        caches,
        rate_limiter,
        alerts,
        metrics,
        prometheus,
        counter_breaker,
        config_breaker,
    };

    // Build CORS layer with allowed origins from config
    let allowed_origins: Vec<axum::http::HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<axum::http::HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin, skipping: {}", origin);
                None
            })
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Build router
    let app = Router::new()
        .nest("/api", routes::api_routes())
        .route("/metrics", get(handlers::metrics::prometheus))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
