use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::limiter::matcher::PathMatcher;
use crate::models::{IpRule, Policy, PolicyRule, Scope};
use crate::resilience::StoreGuard;
use crate::services::cache::{ConfigCaches, RULE_LIST_KEY};

/// Context a check request supplies for policy resolution.
#[derive(Debug, Clone)]
pub struct ResolveInput {
    pub policy_id: Option<Uuid>,
    pub scope: Scope,
    pub resource: Option<String>,
    pub method: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub ip_address: Option<String>,
}

/// Maps a request to exactly one policy via the five-level precedence
/// cascade: explicit id → policy-rule match → IP rule → tenant default →
/// global default. First non-null wins; `None` means NO_POLICY.
///
/// All config-store reads go through the config-store guard (breaker +
/// timeout) and the config caches.
pub struct PolicyResolver {
    db: PgPool,
    caches: Arc<ConfigCaches>,
    guard: StoreGuard,
}

impl PolicyResolver {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>, guard: StoreGuard) -> Self {
        Self { db, caches, guard }
    }

    pub async fn resolve(&self, input: &ResolveInput) -> Result<Option<Policy>, ApiError> {
        // 1. Explicit policy id.
        if let Some(id) = input.policy_id {
            if let Some(policy) = self.policy_by_id(id).await? {
                return Ok(Some(policy));
            }
        }

        // 2. Policy-rule match on resource + method.
        if let Some(resource) = input.resource.as_deref() {
            let rules = self.rule_list().await?;
            if let Some(rule) =
                PathMatcher::select_rule(&rules, resource, input.method.as_deref())
            {
                if let Some(policy) = self.policy_by_id(rule.policy_id).await? {
                    return Ok(Some(policy));
                }
            }
        }

        // 3. IP rule match (tenant-scoped rules first, then global).
        if let Some(ip_str) = input.ip_address.as_deref() {
            if let Ok(ip) = ip_str.parse::<IpAddr>() {
                if let Some(policy_id) = self.ip_policy(ip_str, ip, input.tenant_id).await? {
                    if let Some(policy) = self.policy_by_id(policy_id).await? {
                        return Ok(Some(policy));
                    }
                }
            }
        }

        // 4. Tenant default.
        if let Some(tenant_id) = input.tenant_id {
            if let Some(policy) = self.tenant_default(tenant_id, input.scope).await? {
                return Ok(Some(policy));
            }
        }

        // 5. Global default.
        self.global_default().await
    }

    /// Cached policy-by-id lookup. Negative results are not cached.
    pub async fn policy_by_id(&self, id: Uuid) -> Result<Option<Policy>, ApiError> {
        if let Some(policy) = self.caches.policies.get(&id) {
            return Ok(Some(policy));
        }

        let db = self.db.clone();
        let policy: Option<Policy> = self
            .guard
            .run(async move {
                sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&db)
                    .await
                    .map_err(ApiError::from)
            })
            .await?;

        if let Some(ref p) = policy {
            self.caches.policies.insert(id, p.clone());
        }
        Ok(policy)
    }

    /// The whole enabled-rule list in resolution order, cached as one unit.
    async fn rule_list(&self) -> Result<Arc<Vec<PolicyRule>>, ApiError> {
        if let Some(rules) = self.caches.rule_lists.get(&RULE_LIST_KEY) {
            return Ok(rules);
        }

        let db = self.db.clone();
        let rules: Vec<PolicyRule> = self
            .guard
            .run(async move {
                sqlx::query_as::<_, PolicyRule>(
                    r#"
                    SELECT * FROM policy_rules
                    WHERE enabled
                    ORDER BY priority DESC, created_at ASC
                    "#,
                )
                .fetch_all(&db)
                .await
                .map_err(ApiError::from)
            })
            .await?;

        let rules = Arc::new(rules);
        self.caches.rule_lists.insert(RULE_LIST_KEY, rules.clone());
        Ok(rules)
    }

    /// IP → policy resolution with its own cache. Tenant-scoped rules are
    /// consulted before global ones; within a set an exact address match
    /// beats CIDR containment and the longest prefix wins among CIDRs.
    async fn ip_policy(
        &self,
        ip_str: &str,
        ip: IpAddr,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<Uuid>, ApiError> {
        let cache_key = ConfigCaches::ip_resolution_key(ip_str, tenant_id);
        if let Some(policy_id) = self.caches.ip_resolutions.get(&cache_key) {
            return Ok(Some(policy_id));
        }

        if let Some(tenant_id) = tenant_id {
            let rules = self.fetch_ip_rules(Some(tenant_id)).await?;
            if let Some(rule) = best_ip_rule(&rules, ip) {
                if let Some(policy_id) = rule.policy_id {
                    self.caches.ip_resolutions.insert(cache_key, policy_id);
                    return Ok(Some(policy_id));
                }
            }
        }

        let rules = self.fetch_ip_rules(None).await?;
        if let Some(rule) = best_ip_rule(&rules, ip) {
            if let Some(policy_id) = rule.policy_id {
                self.caches.ip_resolutions.insert(cache_key, policy_id);
                return Ok(Some(policy_id));
            }
        }

        Ok(None)
    }

    async fn fetch_ip_rules(&self, tenant_id: Option<Uuid>) -> Result<Vec<IpRule>, ApiError> {
        let db = self.db.clone();
        self.guard
            .run(async move {
                let query = match tenant_id {
                    Some(id) => sqlx::query_as::<_, IpRule>(
                        r#"
                        SELECT * FROM ip_rules
                        WHERE enabled AND rule_type = 'RATE_LIMIT' AND tenant_id = $1
                        ORDER BY created_at ASC
                        "#,
                    )
                    .bind(id),
                    None => sqlx::query_as::<_, IpRule>(
                        r#"
                        SELECT * FROM ip_rules
                        WHERE enabled AND rule_type = 'RATE_LIMIT' AND tenant_id IS NULL
                        ORDER BY created_at ASC
                        "#,
                    ),
                };
                query.fetch_all(&db).await.map_err(ApiError::from)
            })
            .await
    }

    /// Tenant default, preferring a default declared for the request scope
    /// when the tenant carries defaults for several scopes.
    async fn tenant_default(
        &self,
        tenant_id: Uuid,
        scope: Scope,
    ) -> Result<Option<Policy>, ApiError> {
        let db = self.db.clone();
        self.guard
            .run(async move {
                sqlx::query_as::<_, Policy>(
                    r#"
                    SELECT * FROM policies
                    WHERE tenant_id = $1 AND is_default
                    ORDER BY (scope = $2) DESC, created_at ASC
                    LIMIT 1
                    "#,
                )
                .bind(tenant_id)
                .bind(scope)
                .fetch_optional(&db)
                .await
                .map_err(ApiError::from)
            })
            .await
    }

    async fn global_default(&self) -> Result<Option<Policy>, ApiError> {
        let db = self.db.clone();
        self.guard
            .run(async move {
                sqlx::query_as::<_, Policy>(
                    r#"
                    SELECT * FROM policies
                    WHERE tenant_id IS NULL AND scope = 'GLOBAL' AND is_default
                    LIMIT 1
                    "#,
                )
                .fetch_optional(&db)
                .await
                .map_err(ApiError::from)
            })
            .await
    }
}

/// Rank matching rules: exact host match beats CIDR containment; among
/// CIDRs the longest prefix wins; remaining ties go to the oldest rule
/// (the input is ordered by created_at).
pub fn best_ip_rule(rules: &[IpRule], ip: IpAddr) -> Option<&IpRule> {
    rules
        .iter()
        .filter_map(|rule| rule.match_ip(ip).map(|m| (m, rule)))
        .fold(None, |best: Option<(crate::models::IpMatch, &IpRule)>, (m, rule)| {
            match best {
                Some((best_m, _)) if best_m >= m => best,
                _ => Some((m, rule)),
            }
        })
        .map(|(_, rule)| rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IpRuleType;
    use chrono::{Duration, Utc};

    fn rule(address: Option<&str>, cidr: Option<&str>, age_secs: i64) -> IpRule {
        IpRule {
            id: Uuid::new_v4(),
            tenant_id: None,
            ip_address: address.map(str::to_string),
            ip_cidr: cidr.map(str::to_string),
            rule_type: IpRuleType::RateLimit,
            policy_id: Some(Uuid::new_v4()),
            description: None,
            enabled: true,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn exact_match_beats_cidr() {
        let exact = rule(Some("10.0.0.5"), None, 0);
        let cidr = rule(None, Some("10.0.0.0/8"), 100);
        let exact_id = exact.id;

        let rules = vec![cidr, exact];
        let best = best_ip_rule(&rules, "10.0.0.5".parse().unwrap()).unwrap();
        assert_eq!(best.id, exact_id);
    }

    #[test]
    fn longest_prefix_wins_among_cidrs() {
        let broad = rule(None, Some("10.0.0.0/8"), 100);
        let narrow = rule(None, Some("10.0.0.0/24"), 0);
        let narrow_id = narrow.id;

        let rules = vec![broad, narrow];
        let best = best_ip_rule(&rules, "10.0.0.17".parse().unwrap()).unwrap();
        assert_eq!(best.id, narrow_id);
    }

    #[test]
    fn no_match_yields_none() {
        let rules = vec![rule(None, Some("192.168.0.0/16"), 0)];
        assert!(best_ip_rule(&rules, "10.0.0.1".parse().unwrap()).is_none());
    }

    #[test]
    fn first_rule_wins_on_equal_specificity() {
        let a = rule(None, Some("10.0.0.0/24"), 10);
        let b = rule(None, Some("10.0.0.0/24"), 0);
        let a_id = a.id;

        let rules = vec![a, b];
        let best = best_ip_rule(&rules, "10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(best.id, a_id);
    }
}
