use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::common::TenantTier;

/// Tenant record — matches the `tenants` table in PostgreSQL.
///
/// Deleting a tenant cascades to its policies, API keys, IP rules and user
/// policies (enforced by `ON DELETE CASCADE` foreign keys).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub tier: TenantTier,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
