use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// AlertRule record — deny-rate threshold definition. Matches the
/// `alert_rules` table in PostgreSQL.
///
/// After a trigger, `last_triggered_at + cooldown_seconds` must pass before
/// the rule may fire again.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub policy_id: Option<Uuid>,
    pub threshold_percentage: i32,
    pub window_seconds: i64,
    pub cooldown_seconds: i64,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AlertRule {
    /// True while the rule is still cooling down from its last trigger.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(at) => now < at + Duration::seconds(self.cooldown_seconds),
            None => false,
        }
    }
}

/// Payload handed to notifiers when a rule fires.
#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub policy_id: Uuid,
    pub policy_name: String,
    pub deny_rate: f64,
    pub threshold_percentage: i32,
    pub window_seconds: i64,
    pub total_requests: i64,
    pub denied_requests: i64,
    pub triggered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule(last: Option<DateTime<Utc>>, cooldown: i64) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            name: "high-denies".into(),
            policy_id: Some(Uuid::new_v4()),
            threshold_percentage: 50,
            window_seconds: 60,
            cooldown_seconds: cooldown,
            enabled: true,
            last_triggered_at: last,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn never_triggered_is_not_cooling() {
        let now = Utc::now();
        assert!(!rule(None, 300).in_cooldown(now));
    }

    #[test]
    fn cooldown_window_blocks_until_elapsed() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let r = rule(Some(t0), 300);

        assert!(r.in_cooldown(t0 + Duration::seconds(60)));
        assert!(r.in_cooldown(t0 + Duration::seconds(299)));
        assert!(!r.in_cooldown(t0 + Duration::seconds(300)));
        assert!(!r.in_cooldown(t0 + Duration::seconds(310)));
    }
}
