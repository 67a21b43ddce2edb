use ipnetwork::IpNetwork;
use sqlx::PgPool;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    limiter::resolver::best_ip_rule,
    models::{IpRule, IpRuleType},
    services::cache::ConfigCaches,
};

pub struct IpRuleService {
    db: PgPool,
    caches: Arc<ConfigCaches>,
}

impl IpRuleService {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>) -> Self {
        Self { db, caches }
    }

    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<IpRule>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let (rules, total) = if let Some(tid) = tenant_id {
            let rules: Vec<IpRule> = sqlx::query_as(
                r#"
                SELECT * FROM ip_rules
                WHERE tenant_id = $1
                ORDER BY created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(tid)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ip_rules WHERE tenant_id = $1")
                .bind(tid)
                .fetch_one(&self.db)
                .await?;

            (rules, total.0)
        } else {
            let rules: Vec<IpRule> = sqlx::query_as(
                r#"
                SELECT * FROM ip_rules
                ORDER BY created_at ASC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ip_rules")
                .fetch_one(&self.db)
                .await?;

            (rules, total.0)
        };

        Ok((rules, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<IpRule>, ApiError> {
        if let Some(rule) = self.caches.ip_rules.get(&id) {
            return Ok(Some(rule));
        }

        let rule = sqlx::query_as::<_, IpRule>("SELECT * FROM ip_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(ref r) = rule {
            self.caches.ip_rules.insert(id, r.clone());
        }
        Ok(rule)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        tenant_id: Option<Uuid>,
        ip_address: Option<&str>,
        ip_cidr: Option<&str>,
        rule_type: IpRuleType,
        policy_id: Option<Uuid>,
        description: Option<&str>,
        enabled: bool,
    ) -> Result<IpRule, ApiError> {
        validate_target(ip_address, ip_cidr)?;
        if rule_type == IpRuleType::RateLimit && policy_id.is_none() {
            return Err(ApiError::InvalidInput(
                "RATE_LIMIT rules require policy_id".to_string(),
            ));
        }

        if let Some(pid) = policy_id {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
                .bind(pid)
                .fetch_optional(&self.db)
                .await?;
            if exists.is_none() {
                return Err(ApiError::NotFound("Policy not found".to_string()));
            }
        }
        if let Some(tid) = tenant_id {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenants WHERE id = $1")
                .bind(tid)
                .fetch_optional(&self.db)
                .await?;
            if exists.is_none() {
                return Err(ApiError::NotFound("Tenant not found".to_string()));
            }
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO ip_rules
                (id, tenant_id, ip_address, ip_cidr, rule_type, policy_id, description, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(ip_address)
        .bind(ip_cidr)
        .bind(rule_type)
        .bind(policy_id)
        .bind(description)
        .bind(enabled)
        .execute(&self.db)
        .await?;

        self.caches.invalidate_ip_resolutions();

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn update(
        &self,
        id: Uuid,
        policy_id: Option<Uuid>,
        description: Option<&str>,
        enabled: Option<bool>,
    ) -> Result<IpRule, ApiError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("IP rule not found".to_string()))?;

        if let Some(pid) = policy_id {
            let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
                .bind(pid)
                .fetch_optional(&self.db)
                .await?;
            if exists.is_none() {
                return Err(ApiError::NotFound("Policy not found".to_string()));
            }
        }

        sqlx::query(
            r#"
            UPDATE ip_rules SET
                policy_id = COALESCE($1, policy_id),
                description = COALESCE($2, description),
                enabled = COALESCE($3, enabled)
            WHERE id = $4
            "#,
        )
        .bind(policy_id)
        .bind(description)
        .bind(enabled)
        .bind(id)
        .execute(&self.db)
        .await?;

        self.caches.ip_rules.remove(&id);
        self.caches.invalidate_ip_resolutions();

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM ip_rules WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("IP rule not found".to_string()));
        }

        self.caches.ip_rules.remove(&id);
        self.caches.invalidate_ip_resolutions();
        Ok(())
    }

    /// Diagnostic lookup mirroring the resolver's IP tier: tenant-scoped
    /// rules first, then global; exact beats CIDR, longest prefix wins.
    pub async fn match_ip(
        &self,
        ip_str: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<IpRule>, ApiError> {
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| ApiError::InvalidInput(format!("'{}' is not a valid IP", ip_str)))?;

        if let Some(tid) = tenant_id {
            let rules = self.enabled_rate_limit_rules(Some(tid)).await?;
            if let Some(rule) = best_ip_rule(&rules, ip) {
                return Ok(Some(rule.clone()));
            }
        }

        let rules = self.enabled_rate_limit_rules(None).await?;
        Ok(best_ip_rule(&rules, ip).cloned())
    }

    async fn enabled_rate_limit_rules(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<IpRule>, ApiError> {
        let rules = match tenant_id {
            Some(tid) => {
                sqlx::query_as::<_, IpRule>(
                    r#"
                    SELECT * FROM ip_rules
                    WHERE enabled AND rule_type = 'RATE_LIMIT' AND tenant_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(tid)
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, IpRule>(
                    r#"
                    SELECT * FROM ip_rules
                    WHERE enabled AND rule_type = 'RATE_LIMIT' AND tenant_id IS NULL
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.db)
                .await?
            }
        };
        Ok(rules)
    }
}

/// Exactly one of address/CIDR must be set, and it must parse.
fn validate_target(ip_address: Option<&str>, ip_cidr: Option<&str>) -> Result<(), ApiError> {
    match (ip_address, ip_cidr) {
        (Some(_), Some(_)) | (None, None) => Err(ApiError::InvalidInput(
            "exactly one of ip_address or ip_cidr must be set".to_string(),
        )),
        (Some(addr), None) => {
            addr.parse::<IpAddr>().map_err(|_| {
                ApiError::InvalidInput(format!("'{}' is not a valid IP address", addr))
            })?;
            Ok(())
        }
        (None, Some(cidr)) => {
            cidr.parse::<IpNetwork>().map_err(|_| {
                ApiError::InvalidInput(format!("'{}' is not a valid CIDR range", cidr))
            })?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_must_be_exactly_one() {
        assert!(validate_target(None, None).is_err());
        assert!(validate_target(Some("10.0.0.1"), Some("10.0.0.0/8")).is_err());
        assert!(validate_target(Some("10.0.0.1"), None).is_ok());
        assert!(validate_target(None, Some("10.0.0.0/24")).is_ok());
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!(validate_target(Some("not-an-ip"), None).is_err());
        assert!(validate_target(None, Some("10.0.0.0/99")).is_err());
        assert!(validate_target(None, Some("::/0")).is_ok());
    }
}
