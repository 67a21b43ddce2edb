use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ApiKey, CreatedApiKey},
    services::cache::ConfigCaches,
};

/// Raw keys look like `rk_<40 hex chars>`; the stored prefix is the first
/// 12 characters for display, the stored hash is SHA-256 of the whole key.
const RAW_KEY_BYTES: usize = 20;
const PREFIX_LEN: usize = 12;

pub struct ApiKeyService {
    db: PgPool,
    caches: Arc<ConfigCaches>,
}

impl ApiKeyService {
    pub fn new(db: PgPool, caches: Arc<ConfigCaches>) -> Self {
        Self { db, caches }
    }

    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<ApiKey>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let (keys, total) = if let Some(tid) = tenant_id {
            let keys: Vec<ApiKey> = sqlx::query_as(
                r#"
                SELECT * FROM api_keys
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

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE tenant_id = $1")
                .bind(tid)
                .fetch_one(&self.db)
                .await?;

            (keys, total.0)
        } else {
            let keys: Vec<ApiKey> = sqlx::query_as(
                r#"
                SELECT * FROM api_keys
                ORDER BY created_at DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
                .fetch_one(&self.db)
                .await?;

            (keys, total.0)
        };

        Ok((keys, total))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, ApiError> {
        if let Some(key) = self.caches.api_keys.get(&id) {
            return Ok(Some(key));
        }

        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(ref k) = key {
            self.caches.api_keys.insert(id, k.clone());
        }
        Ok(key)
    }

    /// Mint a new key. The raw key appears exactly once in the returned
    /// payload; only its hash and display prefix are persisted.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        name: &str,
        policy_id: Option<Uuid>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreatedApiKey, ApiError> {
        let tenant_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.db)
            .await?;
        if tenant_exists.is_none() {
            return Err(ApiError::NotFound("Tenant not found".to_string()));
        }

        if let Some(pid) = policy_id {
            let policy_exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM policies WHERE id = $1")
                    .bind(pid)
                    .fetch_optional(&self.db)
                    .await?;
            if policy_exists.is_none() {
                return Err(ApiError::NotFound("Policy not found".to_string()));
            }
        }

        let raw_key = generate_raw_key();
        let key_hash = hash_key(&raw_key);
        let key_prefix = &raw_key[..PREFIX_LEN];

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, tenant_id, policy_id, name, key_hash, key_prefix, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(policy_id)
        .bind(name)
        .bind(&key_hash)
        .bind(key_prefix)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        let api_key = self.get_by_id(id).await?.ok_or(ApiError::Internal)?;
        Ok(CreatedApiKey { api_key, raw_key })
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        policy_id: Option<Uuid>,
        enabled: Option<bool>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKey, ApiError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("API key not found".to_string()))?;

        sqlx::query(
            r#"
            UPDATE api_keys SET
                name = COALESCE($1, name),
                policy_id = COALESCE($2, policy_id),
                enabled = COALESCE($3, enabled),
                expires_at = COALESCE($4, expires_at)
            WHERE id = $5
            "#,
        )
        .bind(name)
        .bind(policy_id)
        .bind(enabled)
        .bind(expires_at)
        .bind(id)
        .execute(&self.db)
        .await?;

        self.caches.api_keys.remove(&id);
        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("API key not found".to_string()));
        }

        self.caches.api_keys.remove(&id);
        Ok(())
    }

    /// Resolve a raw key presented by a gateway to its record, checking
    /// enablement and expiry. `last_used_at` is bumped best-effort — a
    /// failed touch must not fail the lookup.
    pub async fn verify(&self, raw_key: &str) -> Result<Option<ApiKey>, ApiError> {
        let hash = hash_key(raw_key);
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(&hash)
            .fetch_optional(&self.db)
            .await?;

        let Some(key) = key else {
            return Ok(None);
        };
        if !key.enabled || key.is_expired(Utc::now()) {
            return Ok(None);
        }

        if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(key.id)
            .execute(&self.db)
            .await
        {
            tracing::warn!("failed to touch last_used_at for api key {}: {}", key.id, e);
        }

        self.caches.api_keys.insert(key.id, key.clone());
        Ok(Some(key))
    }
}

fn generate_raw_key() -> String {
    let mut bytes = [0u8; RAW_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("rk_{}", hex::encode(bytes))
}

fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_keys_are_prefixed_and_unique() {
        let a = generate_raw_key();
        let b = generate_raw_key();
        assert!(a.starts_with("rk_"));
        assert_eq!(a.len(), 3 + RAW_KEY_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_is_sha256_hex() {
        let hash = hash_key("rk_deadbeef");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_key("rk_deadbeef"));
        assert_ne!(hash, hash_key("rk_deadbeee"));
    }

    #[test]
    fn display_prefix_is_twelve_chars() {
        let raw = generate_raw_key();
        assert_eq!(raw[..PREFIX_LEN].len(), 12);
    }
}
