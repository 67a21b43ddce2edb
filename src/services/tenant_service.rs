use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Tenant, TenantTier},
    services::cache::ConfigCaches,
};

pub struct TenantService {
    db: PgPool,
    caches: Arc<ConfigCaches>,
}

impl TenantService {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>) -> Self {
        Self { db, caches }
    }

    pub async fn list(&self, page: i64, limit: i64) -> Result<(Vec<Tenant>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let tenants: Vec<Tenant> = sqlx::query_as(
            r#"
            SELECT * FROM tenants
            ORDER BY name ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.db)
            .await?;

        Ok((tenants, total.0))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Tenant>, ApiError> {
        if let Some(tenant) = self.caches.tenants.get(&id) {
            return Ok(Some(tenant));
        }

        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(ref t) = tenant {
            self.caches.tenants.insert(id, t.clone());
        }
        Ok(tenant)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Tenant>, ApiError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(tenant)
    }

    pub async fn create(
        &self,
        name: &str,
        tier: TenantTier,
        enabled: bool,
    ) -> Result<Tenant, ApiError> {
        if self.get_by_name(name).await?.is_some() {
            return Err(ApiError::Duplicate(format!(
                "Tenant with name '{}' already exists",
                name
            )));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, tier, enabled)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(tier)
        .bind(enabled)
        .execute(&self.db)
        .await?;

        let tenant = self
            .get_by_id(id)
            .await?
            .ok_or(ApiError::Internal)?;
        self.caches.tenants.insert(id, tenant.clone());
        Ok(tenant)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        tier: Option<TenantTier>,
        enabled: Option<bool>,
    ) -> Result<Tenant, ApiError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Tenant not found".to_string()))?;

        if let Some(new_name) = name {
            if let Some(existing) = self.get_by_name(new_name).await? {
                if existing.id != id {
                    return Err(ApiError::Duplicate(format!(
                        "Tenant with name '{}' already exists",
                        new_name
                    )));
                }
            }
        }

        sqlx::query(
            r#"
            UPDATE tenants SET
                name = COALESCE($1, name),
                tier = COALESCE($2, tier),
                enabled = COALESCE($3, enabled),
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(name)
        .bind(tier)
        .bind(enabled)
        .bind(id)
        .execute(&self.db)
        .await?;

        // Write-through: refresh the cached copy.
        self.caches.tenants.remove(&id);
        let tenant = self
            .get_by_id(id)
            .await?
            .ok_or(ApiError::Internal)?;
        Ok(tenant)
    }

    /// Delete a tenant. Policies, API keys, IP rules and user policies
    /// cascade in the store, so every dependent cache is flushed too.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Tenant not found".to_string()));
        }

        self.caches.tenants.remove(&id);
        self.caches.policies.clear();
        self.caches.invalidate_policy_lookups();
        self.caches.ip_rules.clear();
        self.caches.invalidate_ip_resolutions();
        self.caches.api_keys.clear();
        self.caches.invalidate_rule_lists();
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, ApiError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}
