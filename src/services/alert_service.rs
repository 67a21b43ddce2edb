use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::{
    config::AlertingConfig,
    error::ApiError,
    models::{AlertNotification, AlertRule},
    notifier::Notifier,
    services::MetricsService,
};

/// Periodic deny-rate alerting over the event store.
///
/// Every `check_interval` the scheduler scans enabled alert rules, computes
/// each rule's deny rate over its window via the metrics aggregator, and
/// fans breaches out to all enabled notifiers. A failing rule or notifier
/// never stops the others, and a rule in cooldown is left alone.
pub struct AlertService {
    db: PgPool,
    metrics: MetricsService,
    notifiers: Vec<Box<dyn Notifier>>,
    enabled: bool,
    check_interval: Duration,
    running: AtomicBool,
}

impl AlertService {
    pub fn new(
        db: PgPool,
        metrics: MetricsService,
        notifiers: Vec<Box<dyn Notifier>>,
        cfg: &AlertingConfig,
    ) -> Self {
        Self {
            db,
            metrics,
            notifiers,
            enabled: cfg.enabled,
            check_interval: Duration::from_secs(cfg.check_interval_secs.max(1)),
            running: AtomicBool::new(false),
        }
    }

    /// Start the scheduler on its own task. Ticks are non-reentrant: if an
    /// evaluation is still running when the next tick fires, that tick is
    /// skipped rather than queued.
    pub fn spawn_scheduler(service: Arc<AlertService>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                if !service.enabled {
                    continue;
                }
                if service
                    .running
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    tracing::warn!("alert evaluation still running, skipping tick");
                    continue;
                }

                service.evaluate_all().await;
                service.running.store(false, Ordering::Release);
            }
        })
    }

    /// One full scan. Rule failures are isolated: each is logged and the
    /// scan moves on.
    pub async fn evaluate_all(&self) {
        let rules: Vec<AlertRule> =
            match sqlx::query_as("SELECT * FROM alert_rules WHERE enabled")
                .fetch_all(&self.db)
                .await
            {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::error!("failed to load alert rules: {}", e);
                    return;
                }
            };

        for rule in rules {
            let rule_id = rule.id;
            if let Err(e) = self.evaluate_rule(rule).await {
                tracing::error!("alert rule {} evaluation failed: {}", rule_id, e);
            }
        }
    }

    async fn evaluate_rule(&self, rule: AlertRule) -> Result<(), ApiError> {
        // Global (unbound) alert rules are not supported yet; creation is
        // rejected upstream, but rows predating that check are skipped.
        let Some(policy_id) = rule.policy_id else {
            tracing::debug!("alert rule {} has no bound policy, skipping", rule.id);
            return Ok(());
        };

        let now = Utc::now();
        if rule.in_cooldown(now) {
            return Ok(());
        }

        let from = now - ChronoDuration::seconds(rule.window_seconds);
        let range = self.metrics.metrics_range(policy_id, from, now).await?;

        if range.deny_rate < rule.threshold_percentage as f64 {
            return Ok(());
        }

        let notification = self.build_notification(&rule, policy_id, &range).await?;
        tracing::warn!(
            "alert '{}' fired: policy {} deny rate {:.1}% >= {}%",
            rule.name,
            policy_id,
            range.deny_rate,
            rule.threshold_percentage
        );

        self.dispatch(&notification).await;

        // The cooldown clock starts regardless of notifier outcomes.
        sqlx::query("UPDATE alert_rules SET last_triggered_at = $1 WHERE id = $2")
            .bind(now)
            .bind(rule.id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Manual trigger: bypasses threshold and cooldown but still requires
    /// an enabled rule with a bound policy. Does not start the cooldown.
    pub async fn test_trigger(&self, rule_id: Uuid) -> Result<AlertNotification, ApiError> {
        let rule: Option<AlertRule> = sqlx::query_as("SELECT * FROM alert_rules WHERE id = $1")
            .bind(rule_id)
            .fetch_optional(&self.db)
            .await?;
        let rule = rule.ok_or_else(|| ApiError::NotFound("Alert rule not found".to_string()))?;

        if !rule.enabled {
            return Err(ApiError::InvalidInput(
                "alert rule is disabled".to_string(),
            ));
        }
        let Some(policy_id) = rule.policy_id else {
            return Err(ApiError::InvalidInput(
                "alert rule has no bound policy".to_string(),
            ));
        };

        let now = Utc::now();
        let from = now - ChronoDuration::seconds(rule.window_seconds);
        let range = self.metrics.metrics_range(policy_id, from, now).await?;

        let notification = self.build_notification(&rule, policy_id, &range).await?;
        self.dispatch(&notification).await;
        Ok(notification)
    }

    async fn build_notification(
        &self,
        rule: &AlertRule,
        policy_id: Uuid,
        range: &crate::services::metrics_service::MetricsRange,
    ) -> Result<AlertNotification, ApiError> {
        let policy_name: Option<(String,)> =
            sqlx::query_as("SELECT name FROM policies WHERE id = $1")
                .bind(policy_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(AlertNotification {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            policy_id,
            policy_name: policy_name
                .map(|(name,)| name)
                .unwrap_or_else(|| policy_id.to_string()),
            deny_rate: range.deny_rate,
            threshold_percentage: rule.threshold_percentage,
            window_seconds: rule.window_seconds,
            total_requests: range.total,
            denied_requests: range.denied,
            triggered_at: Utc::now(),
        })
    }

    /// Fan out to every enabled notifier concurrently. Each send is
    /// isolated — one failing or slow channel never blocks the rest.
    async fn dispatch(&self, notification: &AlertNotification) {
        let sends = self
            .notifiers
            .iter()
            .filter(|n| n.enabled())
            .map(|notifier| async move {
                if let Err(e) = notifier.send(notification).await {
                    tracing::error!("notifier '{}' failed: {}", notifier.name(), e);
                }
            });

        join_all(sends).await;
    }
}

/// CRUD for alert rules lives here next to the engine that consumes them.
pub struct AlertRuleStore<'a> {
    db: &'a PgPool,
}

impl<'a> AlertRuleStore<'a> {
    pub fn new(db: &'a PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, page: i64, limit: i64) -> Result<(Vec<AlertRule>, i64), ApiError> {
        let offset = (page - 1) * limit;

        let rules: Vec<AlertRule> = sqlx::query_as(
            r#"
            SELECT * FROM alert_rules
            ORDER BY name ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alert_rules")
            .fetch_one(self.db)
            .await?;

        Ok((rules, total.0))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<AlertRule>, ApiError> {
        let rule = sqlx::query_as::<_, AlertRule>("SELECT * FROM alert_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db)
            .await?;
        Ok(rule)
    }

    pub async fn create(
        &self,
        name: &str,
        policy_id: Uuid,
        threshold_percentage: i32,
        window_seconds: i64,
        cooldown_seconds: i64,
        enabled: bool,
    ) -> Result<AlertRule, ApiError> {
        validate_rule_params(threshold_percentage, window_seconds, cooldown_seconds)?;

        let policy_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM policies WHERE id = $1")
            .bind(policy_id)
            .fetch_optional(self.db)
            .await?;
        if policy_exists.is_none() {
            return Err(ApiError::NotFound("Policy not found".to_string()));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO alert_rules
                (id, name, policy_id, threshold_percentage, window_seconds, cooldown_seconds, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(policy_id)
        .bind(threshold_percentage)
        .bind(window_seconds)
        .bind(cooldown_seconds)
        .bind(enabled)
        .execute(self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: Option<&str>,
        threshold_percentage: Option<i32>,
        window_seconds: Option<i64>,
        cooldown_seconds: Option<i64>,
        enabled: Option<bool>,
    ) -> Result<AlertRule, ApiError> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Alert rule not found".to_string()))?;

        validate_rule_params(
            threshold_percentage.unwrap_or(current.threshold_percentage),
            window_seconds.unwrap_or(current.window_seconds),
            cooldown_seconds.unwrap_or(current.cooldown_seconds),
        )?;

        sqlx::query(
            r#"
            UPDATE alert_rules SET
                name = COALESCE($1, name),
                threshold_percentage = COALESCE($2, threshold_percentage),
                window_seconds = COALESCE($3, window_seconds),
                cooldown_seconds = COALESCE($4, cooldown_seconds),
                enabled = COALESCE($5, enabled)
            WHERE id = $6
            "#,
        )
        .bind(name)
        .bind(threshold_percentage)
        .bind(window_seconds)
        .bind(cooldown_seconds)
        .bind(enabled)
        .bind(id)
        .execute(self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(ApiError::Internal)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1")
            .bind(id)
            .execute(self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Alert rule not found".to_string()));
        }
        Ok(())
    }
}

fn validate_rule_params(
    threshold_percentage: i32,
    window_seconds: i64,
    cooldown_seconds: i64,
) -> Result<(), ApiError> {
    if !(1..=100).contains(&threshold_percentage) {
        return Err(ApiError::InvalidInput(
            "threshold_percentage must be between 1 and 100".to_string(),
        ));
    }
    if window_seconds <= 0 {
        return Err(ApiError::InvalidInput(
            "window_seconds must be positive".to_string(),
        ));
    }
    if cooldown_seconds < 0 {
        return Err(ApiError::InvalidInput(
            "cooldown_seconds must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_param_bounds() {
        assert!(validate_rule_params(1, 60, 0).is_ok());
        assert!(validate_rule_params(100, 60, 300).is_ok());
        assert!(validate_rule_params(0, 60, 300).is_err());
        assert!(validate_rule_params(101, 60, 300).is_err());
        assert!(validate_rule_params(50, 0, 300).is_err());
        assert!(validate_rule_params(50, 60, -1).is_err());
    }
}
