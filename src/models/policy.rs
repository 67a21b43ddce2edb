use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::common::{Algorithm, FailMode, Scope};

/// Policy record — the unit of rate-limit configuration. Matches the
/// `policies` table in PostgreSQL.
///
/// `burst_capacity` and `refill_rate` only apply to the token-bucket
/// algorithm; when absent they default to `max_requests` and
/// `max_requests / window_seconds` respectively (see [`Policy::effective_burst`]
/// and [`Policy::effective_refill_rate`]).
///
/// `tenant_id = NULL` means a global policy. At most one default policy may
/// exist per (tenant, scope) tuple; the single global default has
/// `tenant_id IS NULL AND scope = 'GLOBAL'` (partial unique indexes).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub id: Uuid,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Token-bucket capacity after defaulting.
    pub fn effective_burst(&self) -> i64 {
        self.burst_capacity.unwrap_or(self.max_requests)
    }

    /// Token-bucket refill rate (tokens/sec) after defaulting.
    pub fn effective_refill_rate(&self) -> f64 {
        self.refill_rate
            .unwrap_or(self.max_requests as f64 / self.window_seconds as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: i64, window: i64, burst: Option<i64>, refill: Option<f64>) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            tenant_id: None,
            name: "p".into(),
            scope: Scope::Global,
            algorithm: Algorithm::TokenBucket,
            max_requests: max,
            window_seconds: window,
            burst_capacity: burst,
            refill_rate: refill,
            fail_mode: FailMode::FailOpen,
            enabled: true,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_bucket_defaults() {
        let p = policy(10, 60, None, None);
        assert_eq!(p.effective_burst(), 10);
        assert!((p.effective_refill_rate() - 10.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_burst_and_refill_win() {
        let p = policy(10, 60, Some(25), Some(0.5));
        assert_eq!(p.effective_burst(), 25);
        assert!((p.effective_refill_rate() - 0.5).abs() < 1e-9);
    }
}
