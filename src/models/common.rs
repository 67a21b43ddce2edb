use serde::{Deserialize, Serialize};

/// Layer at which a policy applies. Drives both policy resolution and the
/// counter key space.
///
/// Maps to PostgreSQL enum: `scope AS ENUM ('GLOBAL', 'TENANT', 'API_KEY', 'IP', 'USER')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Global,
    Tenant,
    ApiKey,
    Ip,
    User,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "GLOBAL",
            Scope::Tenant => "TENANT",
            Scope::ApiKey => "API_KEY",
            Scope::Ip => "IP",
            Scope::User => "USER",
        }
    }

    /// Lowercase form used in counter keys (`rl:{algo}:{scope}:{identifier}`).
    pub fn key_segment(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Tenant => "tenant",
            Scope::ApiKey => "api_key",
            Scope::Ip => "ip",
            Scope::User => "user",
        }
    }

    /// Parse a request-supplied scope string. `IP_ADDRESS` and `USER_ID` are
    /// accepted as aliases (older gateway clients send them) but normalize to
    /// the canonical variants; anything else is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GLOBAL" => Some(Scope::Global),
            "TENANT" => Some(Scope::Tenant),
            "API_KEY" => Some(Scope::ApiKey),
            "IP" | "IP_ADDRESS" => Some(Scope::Ip),
            "USER" | "USER_ID" => Some(Scope::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counting algorithm executed against the counter store.
///
/// Maps to PostgreSQL enum:
/// `algorithm AS ENUM ('TOKEN_BUCKET', 'FIXED_WINDOW', 'SLIDING_LOG')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "algorithm", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    TokenBucket,
    FixedWindow,
    SlidingLog,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "TOKEN_BUCKET",
            Algorithm::FixedWindow => "FIXED_WINDOW",
            Algorithm::SlidingLog => "SLIDING_LOG",
        }
    }

    /// Short tag used in counter keys so the three algorithms never collide
    /// on the same Redis key.
    pub fn key_tag(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "tb",
            Algorithm::FixedWindow => "fw",
            Algorithm::SlidingLog => "sl",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior when the counter store is unreachable: FAIL_OPEN admits the
/// request, FAIL_CLOSED rejects it.
///
/// Maps to PostgreSQL enum: `fail_mode AS ENUM ('FAIL_OPEN', 'FAIL_CLOSED')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "fail_mode", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailMode {
    FailOpen,
    FailClosed,
}

impl std::fmt::Display for FailMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailMode::FailOpen => f.write_str("FAIL_OPEN"),
            FailMode::FailClosed => f.write_str("FAIL_CLOSED"),
        }
    }
}

/// Classification of the identifier recorded on a decision event.
///
/// Maps to PostgreSQL enum:
/// `identifier_type AS ENUM ('API_KEY', 'USER', 'IP', 'GLOBAL', 'TENANT')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "identifier_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    ApiKey,
    User,
    Ip,
    Global,
    Tenant,
}

impl From<Scope> for IdentifierType {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::ApiKey => IdentifierType::ApiKey,
            Scope::User => IdentifierType::User,
            Scope::Ip => IdentifierType::Ip,
            Scope::Tenant => IdentifierType::Tenant,
            Scope::Global => IdentifierType::Global,
        }
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierType::ApiKey => f.write_str("API_KEY"),
            IdentifierType::User => f.write_str("USER"),
            IdentifierType::Ip => f.write_str("IP"),
            IdentifierType::Global => f.write_str("GLOBAL"),
            IdentifierType::Tenant => f.write_str("TENANT"),
        }
    }
}

/// Tenant service tier.
///
/// Maps to PostgreSQL enum:
/// `tenant_tier AS ENUM ('FREE', 'BASIC', 'PREMIUM', 'ENTERPRISE')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tenant_tier", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantTier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl std::fmt::Display for TenantTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantTier::Free => f.write_str("FREE"),
            TenantTier::Basic => f.write_str("BASIC"),
            TenantTier::Premium => f.write_str("PREMIUM"),
            TenantTier::Enterprise => f.write_str("ENTERPRISE"),
        }
    }
}

/// IP rule kind. Only RATE_LIMIT is live today; ALLOW/BLOCK are reserved so
/// the enum does not need a breaking migration when they land.
///
/// Maps to PostgreSQL enum:
/// `ip_rule_type AS ENUM ('RATE_LIMIT', 'ALLOW', 'BLOCK')`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ip_rule_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpRuleType {
    RateLimit,
    Allow,
    Block,
}

impl std::fmt::Display for IpRuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpRuleType::RateLimit => f.write_str("RATE_LIMIT"),
            IpRuleType::Allow => f.write_str("ALLOW"),
            IpRuleType::Block => f.write_str("BLOCK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_aliases_normalize() {
        assert_eq!(Scope::parse("USER_ID"), Some(Scope::User));
        assert_eq!(Scope::parse("IP_ADDRESS"), Some(Scope::Ip));
        assert_eq!(Scope::parse("api_key"), Some(Scope::ApiKey));
        assert_eq!(Scope::parse("bogus"), None);
    }

    #[test]
    fn scope_to_identifier_type() {
        assert_eq!(IdentifierType::from(Scope::User), IdentifierType::User);
        assert_eq!(IdentifierType::from(Scope::ApiKey), IdentifierType::ApiKey);
        assert_eq!(IdentifierType::from(Scope::Global), IdentifierType::Global);
    }

    #[test]
    fn key_segments_are_lowercase() {
        assert_eq!(Scope::ApiKey.key_segment(), "api_key");
        assert_eq!(Algorithm::SlidingLog.key_tag(), "sl");
    }
}
