use sqlx::PgPool;
use uuid::Uuid;

use crate::{error::ApiError, models::UserPolicy};

pub struct UserPolicyService {
    db: PgPool,
}

impl UserPolicyService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<UserPolicy>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let (mappings, total) = if let Some(tid) = tenant_id {
            let mappings: Vec<UserPolicy> = sqlx::query_as(
                r#"
                SELECT * FROM user_policies
                WHERE tenant_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(tid)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM user_policies WHERE tenant_id = $1")
                    .bind(tid)
                    .fetch_one(&self.db)
                    .await?;

            (mappings, total.0)
        } else {
            let mappings: Vec<UserPolicy> = sqlx::query_as(
                r#"
                SELECT * FROM user_policies
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_policies")
                .fetch_one(&self.db)
                .await?;

            (mappings, total.0)
        };

        Ok((mappings, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<UserPolicy>, ApiError> {
        let mapping = sqlx::query_as::<_, UserPolicy>("SELECT * FROM user_policies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(mapping)
    }

    pub async fn find(
        &self,
        user_id: &str,
        tenant_id: Uuid,
    ) -> Result<Option<UserPolicy>, ApiError> {
        let mapping = sqlx::query_as::<_, UserPolicy>(
            "SELECT * FROM user_policies WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(mapping)
    }

    pub async fn create(
        &self,
        user_id: &str,
        tenant_id: Uuid,
        policy_id: Uuid,
    ) -> Result<UserPolicy, ApiError> {
        if user_id.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "user_id must not be blank".to_string(),
            ));
        }

        if self.find(user_id, tenant_id).await?.is_some() {
            return Err(ApiError::Duplicate(format!(
                "User '{}' already has a policy in this tenant",
                user_id
            )));
        }

        let tenant_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.db)
            .await?;
        if tenant_exists.is_none() {
            return Err(ApiError::NotFound("Tenant not found".to_string()));
        }

        let policy_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
            .bind(policy_id)
            .fetch_optional(&self.db)
            .await?;
        if policy_exists.is_none() {
            return Err(ApiError::NotFound("Policy not found".to_string()));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO user_policies (id, user_id, tenant_id, policy_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(tenant_id)
        .bind(policy_id)
        .execute(&self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn update(&self, id: Uuid, policy_id: Uuid) -> Result<UserPolicy, ApiError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User policy not found".to_string()))?;

        let policy_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
            .bind(policy_id)
            .fetch_optional(&self.db)
            .await?;
        if policy_exists.is_none() {
            return Err(ApiError::NotFound("Policy not found".to_string()));
        }

        sqlx::query("UPDATE user_policies SET policy_id = $1 WHERE id = $2")
            .bind(policy_id)
            .bind(id)
            .execute(&self.db)
            .await?;

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM user_policies WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("User policy not found".to_string()));
        }
        Ok(())
    }
}
