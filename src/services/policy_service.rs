use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Algorithm, FailMode, Policy, Scope},
    services::cache::ConfigCaches,
};

/// Fields accepted when creating a policy. Token-bucket extras
/// (`burst_capacity`, `refill_rate`) are rejected for other algorithms.
#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub scope: Scope,
    pub algorithm: Algorithm,
    pub max_requests: i64,
    pub window_seconds: i64,
    pub burst_capacity: Option<i64>,
    pub refill_rate: Option<f64>,
    pub fail_mode: FailMode,
    pub enabled: bool,
    pub is_default: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct PolicyPatch {
    pub name: Option<String>,
    pub max_requests: Option<i64>,
    pub window_seconds: Option<i64>,
    pub burst_capacity: Option<i64>,
    pub refill_rate: Option<f64>,
    pub fail_mode: Option<FailMode>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

pub struct PolicyService {
    db: PgPool,
    caches: Arc<ConfigCaches>,
}

impl PolicyService {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>) -> Self {
        Self { db, caches }
    }

    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Policy>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let (policies, total) = if let Some(tid) = tenant_id {
            let policies: Vec<Policy> = sqlx::query_as(
                r#"
                SELECT * FROM policies
                WHERE tenant_id = $1
                ORDER BY name ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(tid)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM policies WHERE tenant_id = $1")
                .bind(tid)
                .fetch_one(&self.db)
                .await?;

            (policies, total.0)
        } else {
            let policies: Vec<Policy> = sqlx::query_as(
                r#"
                SELECT * FROM policies
                ORDER BY name ASC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM policies")
                .fetch_one(&self.db)
                .await?;

            (policies, total.0)
        };

        Ok((policies, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Policy>, ApiError> {
        if let Some(policy) = self.caches.policies.get(&id) {
            return Ok(Some(policy));
        }

        let policy = sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(ref p) = policy {
            self.caches.policies.insert(id, p.clone());
        }
        Ok(policy)
    }

    pub async fn get_by_name(
        &self,
        name: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Option<Policy>, ApiError> {
        let key = ConfigCaches::policy_name_key(name, tenant_id);
        if let Some(policy) = self.caches.policies_by_name.get(&key) {
            return Ok(Some(policy));
        }

        let policy = match tenant_id {
            Some(tid) => {
                sqlx::query_as::<_, Policy>(
                    "SELECT * FROM policies WHERE name = $1 AND tenant_id = $2",
                )
                .bind(name)
                .bind(tid)
                .fetch_optional(&self.db)
                .await?
            }
            None => {
                sqlx::query_as::<_, Policy>(
                    "SELECT * FROM policies WHERE name = $1 AND tenant_id IS NULL",
                )
                .bind(name)
                .fetch_optional(&self.db)
                .await?
            }
        };

        if let Some(ref p) = policy {
            self.caches.policies_by_name.insert(key, p.clone());
        }
        Ok(policy)
    }

    pub async fn create(&self, input: NewPolicy) -> Result<Policy, ApiError> {
        validate_policy_params(
            input.algorithm,
            input.max_requests,
            input.window_seconds,
            input.burst_capacity,
            input.refill_rate,
        )?;

        if self
            .get_by_name(&input.name, input.tenant_id)
            .await?
            .is_some()
        {
            return Err(ApiError::Duplicate(format!(
                "Policy with name '{}' already exists",
                input.name
            )));
        }

        if let Some(tid) = input.tenant_id {
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
            INSERT INTO policies
                (id, tenant_id, name, scope, algorithm, max_requests, window_seconds,
                 burst_capacity, refill_rate, fail_mode, enabled, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.scope)
        .bind(input.algorithm)
        .bind(input.max_requests)
        .bind(input.window_seconds)
        .bind(input.burst_capacity)
        .bind(input.refill_rate)
        .bind(input.fail_mode)
        .bind(input.enabled)
        .bind(input.is_default)
        .execute(&self.db)
        .await?;

        self.caches.invalidate_policy_lookups();

        let policy = self.get_by_id(id).await?.ok_or(ApiError::Internal)?;
        Ok(policy)
    }

    pub async fn update(&self, id: Uuid, patch: PolicyPatch) -> Result<Policy, ApiError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Policy not found".to_string()))?;

        validate_policy_params(
            current.algorithm,
            patch.max_requests.unwrap_or(current.max_requests),
            patch.window_seconds.unwrap_or(current.window_seconds),
            patch.burst_capacity.or(current.burst_capacity),
            patch.refill_rate.or(current.refill_rate),
        )?;

        if let Some(ref new_name) = patch.name {
            if let Some(existing) = self.get_by_name(new_name, current.tenant_id).await? {
                if existing.id != id {
                    return Err(ApiError::Duplicate(format!(
                        "Policy with name '{}' already exists",
                        new_name
                    )));
                }
            }
        }

        sqlx::query(
            r#"
            UPDATE policies SET
                name = COALESCE($1, name),
                max_requests = COALESCE($2, max_requests),
                window_seconds = COALESCE($3, window_seconds),
                burst_capacity = COALESCE($4, burst_capacity),
                refill_rate = COALESCE($5, refill_rate),
                fail_mode = COALESCE($6, fail_mode),
                enabled = COALESCE($7, enabled),
                is_default = COALESCE($8, is_default),
                updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(patch.name)
        .bind(patch.max_requests)
        .bind(patch.window_seconds)
        .bind(patch.burst_capacity)
        .bind(patch.refill_rate)
        .bind(patch.fail_mode)
        .bind(patch.enabled)
        .bind(patch.is_default)
        .bind(id)
        .execute(&self.db)
        .await?;

        // Write-through on the id cache, wholesale on the name cache.
        self.caches.policies.remove(&id);
        self.caches.invalidate_policy_lookups();

        let policy = self.get_by_id(id).await?.ok_or(ApiError::Internal)?;
        Ok(policy)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM policies WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Policy not found".to_string()));
        }

        // Rules and IP rules referencing the policy cascade away.
        self.caches.policies.remove(&id);
        self.caches.invalidate_policy_lookups();
        self.caches.invalidate_rule_lists();
        self.caches.invalidate_ip_resolutions();
        Ok(())
    }
}

/// Shared parameter validation for create and update paths.
fn validate_policy_params(
    algorithm: Algorithm,
    max_requests: i64,
    window_seconds: i64,
    burst_capacity: Option<i64>,
    refill_rate: Option<f64>,
) -> Result<(), ApiError> {
    if max_requests <= 0 {
        return Err(ApiError::InvalidInput(
            "max_requests must be positive".to_string(),
        ));
    }
    if window_seconds <= 0 {
        return Err(ApiError::InvalidInput(
            "window_seconds must be positive".to_string(),
        ));
    }
    if let Some(burst) = burst_capacity {
        if algorithm != Algorithm::TokenBucket {
            return Err(ApiError::InvalidInput(
                "burst_capacity only applies to TOKEN_BUCKET".to_string(),
            ));
        }
        if burst <= 0 {
            return Err(ApiError::InvalidInput(
                "burst_capacity must be positive".to_string(),
            ));
        }
    }
    if let Some(rate) = refill_rate {
        if algorithm != Algorithm::TokenBucket {
            return Err(ApiError::InvalidInput(
                "refill_rate only applies to TOKEN_BUCKET".to_string(),
            ));
        }
        if rate <= 0.0 {
            return Err(ApiError::InvalidInput(
                "refill_rate must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_token_bucket_extras_on_other_algorithms() {
        assert!(validate_policy_params(Algorithm::FixedWindow, 10, 60, Some(5), None).is_err());
        assert!(validate_policy_params(Algorithm::SlidingLog, 10, 60, None, Some(0.5)).is_err());
        assert!(validate_policy_params(Algorithm::TokenBucket, 10, 60, Some(5), Some(0.5)).is_ok());
    }

    #[test]
    fn rejects_non_positive_limits() {
        assert!(validate_policy_params(Algorithm::FixedWindow, 0, 60, None, None).is_err());
        assert!(validate_policy_params(Algorithm::FixedWindow, 10, 0, None, None).is_err());
        assert!(validate_policy_params(Algorithm::TokenBucket, 10, 60, Some(0), None).is_err());
        assert!(validate_policy_params(Algorithm::TokenBucket, 10, 60, None, Some(0.0)).is_err());
    }
}
