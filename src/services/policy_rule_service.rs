use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    limiter::PathMatcher,
    models::PolicyRule,
    services::cache::ConfigCaches,
};

/// Result of the diagnostic match endpoint: the winning rule plus every
/// rule that matched, with the winner's extracted path variables.
#[derive(Debug, serde::Serialize)]
pub struct RuleMatch {
    pub matched: Option<PolicyRule>,
    pub variables: HashMap<String, String>,
    pub candidates: Vec<PolicyRule>,
}

pub struct PolicyRuleService {
    db: PgPool,
    caches: Arc<ConfigCaches>,
}

impl PolicyRuleService {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>) -> Self {
        Self { db, caches }
    }

    pub async fn list(
        &self,
        policy_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<PolicyRule>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let (rules, total) = if let Some(pid) = policy_id {
            let rules: Vec<PolicyRule> = sqlx::query_as(
                r#"
                SELECT * FROM policy_rules
                WHERE policy_id = $1
                ORDER BY priority DESC, created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pid)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM policy_rules WHERE policy_id = $1")
                    .bind(pid)
                    .fetch_one(&self.db)
                    .await?;

            (rules, total.0)
        } else {
            let rules: Vec<PolicyRule> = sqlx::query_as(
                r#"
                SELECT * FROM policy_rules
                ORDER BY priority DESC, created_at ASC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM policy_rules")
                .fetch_one(&self.db)
                .await?;

            (rules, total.0)
        };

        Ok((rules, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<PolicyRule>, ApiError> {
        let rule = sqlx::query_as::<_, PolicyRule>("SELECT * FROM policy_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(rule)
    }

    pub async fn create(
        &self,
        policy_id: Uuid,
        name: &str,
        resource_pattern: &str,
        http_methods: Option<&str>,
        priority: i32,
        enabled: bool,
    ) -> Result<PolicyRule, ApiError> {
        PathMatcher::validate(resource_pattern).map_err(ApiError::InvalidInput)?;
        validate_priority(priority)?;
        let methods = normalize_methods(http_methods)?;

        let policy_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
            .bind(policy_id)
            .fetch_optional(&self.db)
            .await?;
        if policy_exists.is_none() {
            return Err(ApiError::NotFound("Policy not found".to_string()));
        }

        let duplicate: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM policy_rules WHERE policy_id = $1 AND name = $2")
                .bind(policy_id)
                .bind(name)
                .fetch_optional(&self.db)
                .await?;
        if duplicate.is_some() {
            return Err(ApiError::Duplicate(format!(
                "Rule with name '{}' already exists for this policy",
                name
            )));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO policy_rules (id, policy_id, name, resource_pattern, http_methods, priority, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(policy_id)
        .bind(name)
        .bind(resource_pattern)
        .bind(methods)
        .bind(priority)
        .bind(enabled)
        .execute(&self.db)
        .await?;

        self.caches.invalidate_rule_lists();

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        resource_pattern: Option<&str>,
        http_methods: Option<&str>,
        priority: Option<i32>,
        enabled: Option<bool>,
    ) -> Result<PolicyRule, ApiError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Policy rule not found".to_string()))?;

        if let Some(pattern) = resource_pattern {
            PathMatcher::validate(pattern).map_err(ApiError::InvalidInput)?;
        }
        if let Some(p) = priority {
            validate_priority(p)?;
        }
        let methods = normalize_methods(http_methods)?;

        if let Some(new_name) = name {
            let duplicate: Option<(Uuid,)> = sqlx::query_as(
                "SELECT id FROM policy_rules WHERE policy_id = $1 AND name = $2 AND id <> $3",
            )
            .bind(current.policy_id)
            .bind(new_name)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
            if duplicate.is_some() {
                return Err(ApiError::Duplicate(format!(
                    "Rule with name '{}' already exists for this policy",
                    new_name
                )));
            }
        }

        sqlx::query(
            r#"
            UPDATE policy_rules SET
                name = COALESCE($1, name),
                resource_pattern = COALESCE($2, resource_pattern),
                http_methods = COALESCE($3, http_methods),
                priority = COALESCE($4, priority),
                enabled = COALESCE($5, enabled)
            WHERE id = $6
            "#,
        )
        .bind(name)
        .bind(resource_pattern)
        .bind(methods)
        .bind(priority)
        .bind(enabled)
        .bind(id)
        .execute(&self.db)
        .await?;

        self.caches.invalidate_rule_lists();

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM policy_rules WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Policy rule not found".to_string()));
        }

        self.caches.invalidate_rule_lists();
        Ok(())
    }

    /// Diagnostic lookup: which rules match this path + method, and which
    /// one wins resolution.
    pub async fn match_path(&self, path: &str, method: Option<&str>) -> Result<RuleMatch, ApiError> {
        if !path.starts_with('/') {
            return Err(ApiError::InvalidInput(
                "path must start with '/'".to_string(),
            ));
        }

        let rules: Vec<PolicyRule> = sqlx::query_as(
            r#"
            SELECT * FROM policy_rules
            WHERE enabled
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let candidates: Vec<PolicyRule> = rules
            .iter()
            .filter(|rule| {
                method.is_none_or(|m| rule.matches_method(m))
                    && PathMatcher::matches(&rule.resource_pattern, path)
            })
            .cloned()
            .collect();

        let matched = PathMatcher::select_rule(&rules, path, method).cloned();
        let variables = matched
            .as_ref()
            .map(|rule| PathMatcher::extract_variables(&rule.resource_pattern, path))
            .unwrap_or_default();

        Ok(RuleMatch {
            matched,
            variables,
            candidates,
        })
    }
}

fn validate_priority(priority: i32) -> Result<(), ApiError> {
    if !(0..=1000).contains(&priority) {
        return Err(ApiError::InvalidInput(
            "priority must be between 0 and 1000".to_string(),
        ));
    }
    Ok(())
}

/// Normalize a comma-separated method list to uppercase, rejecting unknown
/// verbs. `None` propagates (meaning "any method").
fn normalize_methods(methods: Option<&str>) -> Result<Option<String>, ApiError> {
    const KNOWN: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

    let Some(raw) = methods else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let mut normalized = Vec::new();
    for part in raw.split(',') {
        let verb = part.trim().to_uppercase();
        if !KNOWN.contains(&verb.as_str()) {
            return Err(ApiError::InvalidInput(format!(
                "unknown HTTP method '{}'",
                part.trim()
            )));
        }
        normalized.push(verb);
    }
    Ok(Some(normalized.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_normalize_to_uppercase() {
        assert_eq!(
            normalize_methods(Some("get, Post")).unwrap(),
            Some("GET,POST".to_string())
        );
        assert_eq!(normalize_methods(Some("  ")).unwrap(), None);
        assert_eq!(normalize_methods(None).unwrap(), None);
        assert!(normalize_methods(Some("FETCH")).is_err());
    }

    #[test]
    fn priority_bounds() {
        assert!(validate_priority(0).is_ok());
        assert!(validate_priority(1000).is_ok());
        assert!(validate_priority(-1).is_err());
        assert!(validate_priority(1001).is_err());
    }
}
