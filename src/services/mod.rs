pub mod alert_service;
pub mod api_key_service;
pub mod cache;
pub mod ip_rule_service;
pub mod metrics_service;
pub mod policy_rule_service;
pub mod policy_service;
pub mod rate_limit_service;
pub mod tenant_service;
pub mod user_policy_service;

pub use alert_service::AlertService;
pub use api_key_service::ApiKeyService;
pub use cache::{CacheStats, ConfigCaches, TtlCache};
pub use ip_rule_service::IpRuleService;
pub use metrics_service::MetricsService;
pub use policy_rule_service::PolicyRuleService;
pub use policy_service::PolicyService;
pub use rate_limit_service::RateLimitService;
pub use tenant_service::TenantService;
pub use user_policy_service::UserPolicyService;
