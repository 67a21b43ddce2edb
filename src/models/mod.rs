pub mod alert_rule;
pub mod api_key;
pub mod common;
pub mod event;
pub mod ip_rule;
pub mod policy;
pub mod policy_rule;
pub mod tenant;
pub mod user_policy;

pub use alert_rule::{AlertNotification, AlertRule};
pub use api_key::{ApiKey, CreatedApiKey};
pub use common::{Algorithm, FailMode, IdentifierType, IpRuleType, Scope, TenantTier};
pub use event::{NewRateLimitEvent, RateLimitEvent};
pub use ip_rule::{IpMatch, IpRule};
pub use policy::Policy;
pub use policy_rule::PolicyRule;
pub use tenant::Tenant;
pub use user_policy::UserPolicy;
