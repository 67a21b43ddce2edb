use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{IdentifierType, RateLimitEvent},
};

/// Aggregates over a time range of decision events.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRange {
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub deny_rate: f64,
}

/// Lifetime aggregates plus a per-identifier-type breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total: i64,
    pub allowed: i64,
    pub denied: i64,
    pub deny_rate: f64,
    pub by_identifier_type: HashMap<String, i64>,
}

/// Read-only aggregation over the event store. All math happens in the
/// database — the service never streams event rows.
#[derive(Clone)]
pub struct MetricsService {
    db: PgPool,
}

impl MetricsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn metrics_range(
        &self,
        policy_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MetricsRange, ApiError> {
        let (total, allowed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE allowed)
            FROM rate_limit_events
            WHERE policy_id = $1 AND event_time >= $2 AND event_time < $3
            "#,
        )
        .bind(policy_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.db)
        .await?;

        let denied = total - allowed;
        Ok(MetricsRange {
            total,
            allowed,
            denied,
            deny_rate: deny_rate(denied, total),
        })
    }

    pub async fn summary(&self, policy_id: Uuid) -> Result<MetricsSummary, ApiError> {
        let (total, allowed): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE allowed)
            FROM rate_limit_events
            WHERE policy_id = $1
            "#,
        )
        .bind(policy_id)
        .fetch_one(&self.db)
        .await?;

        let breakdown: Vec<(IdentifierType, i64)> = sqlx::query_as(
            r#"
            SELECT identifier_type, COUNT(*)
            FROM rate_limit_events
            WHERE policy_id = $1
            GROUP BY identifier_type
            "#,
        )
        .bind(policy_id)
        .fetch_all(&self.db)
        .await?;

        let denied = total - allowed;
        Ok(MetricsSummary {
            total,
            allowed,
            denied,
            deny_rate: deny_rate(denied, total),
            by_identifier_type: breakdown
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
        })
    }

    /// Bounded debug listing of the newest decisions for a policy. This is
    /// the one place raw event rows leave the store, capped hard at 200.
    pub async fn recent_events(
        &self,
        policy_id: Uuid,
        limit: i64,
    ) -> Result<Vec<RateLimitEvent>, ApiError> {
        let events: Vec<RateLimitEvent> = sqlx::query_as(
            r#"
            SELECT * FROM rate_limit_events
            WHERE policy_id = $1
            ORDER BY event_time DESC
            LIMIT $2
            "#,
        )
        .bind(policy_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.db)
        .await?;
        Ok(events)
    }
}

/// `100 * denied / total`, 0 when there is no traffic.
pub fn deny_rate(denied: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        denied as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_rate_handles_empty_windows() {
        assert_eq!(deny_rate(0, 0), 0.0);
        assert_eq!(deny_rate(0, 10), 0.0);
        assert_eq!(deny_rate(5, 10), 50.0);
        assert_eq!(deny_rate(10, 10), 100.0);
    }
}
