use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::common::IdentifierType;

/// Immutable rate-limit decision record. Matches the `rate_limit_events`
/// table, list-partitioned by `partition_key`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateLimitEvent {
    pub id: i64,
    pub policy_id: Option<Uuid>,
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub allowed: bool,
    pub remaining: i64,
    pub limit_value: i64,
    pub ip_address: Option<String>,
    pub resource: Option<String>,
    pub event_time: DateTime<Utc>,
    pub partition_key: String,
}

/// Event as produced by the hot path, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewRateLimitEvent {
    pub policy_id: Option<Uuid>,
    pub identifier: String,
    pub identifier_type: IdentifierType,
    pub allowed: bool,
    pub remaining: i64,
    pub limit_value: i64,
    pub ip_address: Option<String>,
    pub resource: Option<String>,
    pub event_time: DateTime<Utc>,
}

impl NewRateLimitEvent {
    /// `YYYY-MM` partition tag derived from the event time in UTC.
    pub fn partition_key(&self) -> String {
        partition_key(self.event_time)
    }
}

pub fn partition_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn partition_key_is_utc_year_month() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(partition_key(at), "2026-03");

        let at = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
        assert_eq!(partition_key(at), "2026-11");
    }

    #[test]
    fn single_digit_month_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(partition_key(at), "2025-07");
    }
}
