pub mod database;
mod redis;
mod settings;

pub use database::DatabaseConfig;
pub use redis::RedisConfig;
pub use settings::{
    AlertingConfig, BreakerSettings, CacheConfig, CounterConfig, IngestConfig, ServerConfig,
    Settings,
};
