use super::{DatabaseConfig, RedisConfig};
use anyhow::Result;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Counter-store call behavior: tight per-call timeout plus the retry
/// policy applied to transport failures only.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub call_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

/// Circuit-breaker knobs shared by both breakers, with per-store open
/// durations (the counter store recovers faster than the config store).
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub window_size: usize,
    pub minimum_calls: usize,
    pub failure_rate_threshold: f64,
    pub counter_open_secs: u64,
    pub config_open_secs: u64,
    pub half_open_permitted_calls: u32,
    pub config_store_timeout_ms: u64,
}

/// Async event-ingest pipeline geometry.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub slack_webhook_url: Option<String>,
    pub webhook_url: Option<String>,
}

/// Config-cache geometry. IP caches run a shorter TTL for security
/// posture; API keys additionally expire on idleness.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub policy_max_size: usize,
    pub policy_ttl_secs: u64,
    pub tenant_max_size: usize,
    pub tenant_ttl_secs: u64,
    pub ip_rule_max_size: usize,
    pub ip_rule_ttl_secs: u64,
    pub ip_resolution_max_size: usize,
    pub api_key_max_size: usize,
    pub api_key_ttl_secs: u64,
    pub api_key_idle_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub counter: CounterConfig,
    pub breakers: BreakerSettings,
    pub ingest: IngestConfig,
    pub alerting: AlertingConfig,
    pub cache: CacheConfig,
    pub cors: CorsConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env_or("PORT", 8080),
                host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 20),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 5),
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            counter: CounterConfig {
                call_timeout_ms: env_or("COUNTER_TIMEOUT_MS", 50),
                retry_attempts: env_or("COUNTER_RETRY_ATTEMPTS", 3),
                retry_backoff_ms: env_or("COUNTER_RETRY_BACKOFF_MS", 100),
            },
            breakers: BreakerSettings {
                window_size: env_or("BREAKER_WINDOW_SIZE", 10),
                minimum_calls: env_or("BREAKER_MIN_CALLS", 5),
                failure_rate_threshold: env_or("BREAKER_FAILURE_RATE", 50.0),
                counter_open_secs: env_or("COUNTER_BREAKER_OPEN_SECS", 5),
                config_open_secs: env_or("CONFIG_BREAKER_OPEN_SECS", 10),
                half_open_permitted_calls: env_or("BREAKER_HALF_OPEN_CALLS", 3),
                config_store_timeout_ms: env_or("CONFIG_STORE_TIMEOUT_MS", 500),
            },
            ingest: IngestConfig {
                queue_capacity: env_or("INGEST_QUEUE_CAPACITY", 500),
                workers: env_or("INGEST_WORKERS", 2),
                batch_size: env_or("INGEST_BATCH_SIZE", 100),
            },
            alerting: AlertingConfig {
                enabled: env_or("ALERTING_ENABLED", true),
                check_interval_secs: env_or("ALERTING_CHECK_INTERVAL_SECS", 60),
                slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
                webhook_url: env_opt("ALERT_WEBHOOK_URL"),
            },
            cache: CacheConfig {
                policy_max_size: env_or("CACHE_POLICY_MAX_SIZE", 1000),
                policy_ttl_secs: env_or("CACHE_POLICY_TTL_SECS", 300),
                tenant_max_size: env_or("CACHE_TENANT_MAX_SIZE", 500),
                tenant_ttl_secs: env_or("CACHE_TENANT_TTL_SECS", 600),
                ip_rule_max_size: env_or("CACHE_IP_RULE_MAX_SIZE", 5000),
                ip_rule_ttl_secs: env_or("CACHE_IP_RULE_TTL_SECS", 120),
                ip_resolution_max_size: env_or("CACHE_IP_RESOLUTION_MAX_SIZE", 10000),
                api_key_max_size: env_or("CACHE_API_KEY_MAX_SIZE", 2000),
                api_key_ttl_secs: env_or("CACHE_API_KEY_TTL_SECS", 300),
                api_key_idle_ttl_secs: env_or("CACHE_API_KEY_IDLE_TTL_SECS", 180),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
        })
    }
}
