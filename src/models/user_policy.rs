use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// UserPolicy record — maps an external user identifier (opaque string from
/// the IAM) to a policy within a tenant. Matches the `user_policies` table;
/// UNIQUE on (user_id, tenant_id).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPolicy {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: Uuid,
    pub policy_id: Uuid,
    pub created_at: DateTime<Utc>,
}
