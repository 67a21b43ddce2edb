#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}
