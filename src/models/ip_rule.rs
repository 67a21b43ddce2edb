use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::net::IpAddr;
use uuid::Uuid;

use crate::models::common::IpRuleType;

/// IpRule record — IP-scoped policy assignment. Matches the `ip_rules`
/// table in PostgreSQL.
///
/// Exactly one of `ip_address` (single host) or `ip_cidr` (range) is set
/// (CHECK constraint). RATE_LIMIT rules always carry a `policy_id`.
/// `tenant_id = NULL` means the rule is global.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IpRule {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub ip_cidr: Option<String>,
    pub rule_type: IpRuleType,
    pub policy_id: Option<Uuid>,
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// How specifically a rule matched a client IP. Exact host rules always
/// beat CIDR containment; among CIDR matches the longest prefix wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IpMatch {
    Cidr { prefix_len: u8 },
    Exact,
}

impl IpRule {
    /// Check this rule against a client address, returning the match kind
    /// when it applies. Unparseable stored values never match.
    pub fn match_ip(&self, ip: IpAddr) -> Option<IpMatch> {
        if let Some(addr) = self.ip_address.as_deref() {
            return match addr.parse::<IpAddr>() {
                Ok(stored) if stored == ip => Some(IpMatch::Exact),
                _ => None,
            };
        }
        if let Some(cidr) = self.ip_cidr.as_deref() {
            return match cidr.parse::<IpNetwork>() {
                Ok(net) if net.contains(ip) => Some(IpMatch::Cidr {
                    prefix_len: net.prefix(),
                }),
                _ => None,
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(address: Option<&str>, cidr: Option<&str>) -> IpRule {
        IpRule {
            id: Uuid::new_v4(),
            tenant_id: None,
            ip_address: address.map(str::to_string),
            ip_cidr: cidr.map(str::to_string),
            rule_type: IpRuleType::RateLimit,
            policy_id: Some(Uuid::new_v4()),
            description: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn exact_match() {
        let r = rule(Some("10.0.0.5"), None);
        assert_eq!(r.match_ip("10.0.0.5".parse().unwrap()), Some(IpMatch::Exact));
        assert_eq!(r.match_ip("10.0.0.6".parse().unwrap()), None);
    }

    #[test]
    fn cidr_containment() {
        let r = rule(None, Some("10.0.0.0/24"));
        assert_eq!(
            r.match_ip("10.0.0.99".parse().unwrap()),
            Some(IpMatch::Cidr { prefix_len: 24 })
        );
        assert_eq!(r.match_ip("10.0.1.1".parse().unwrap()), None);
    }

    #[test]
    fn exact_outranks_any_cidr() {
        assert!(IpMatch::Exact > IpMatch::Cidr { prefix_len: 32 });
        assert!(IpMatch::Cidr { prefix_len: 24 } > IpMatch::Cidr { prefix_len: 16 });
    }
}
