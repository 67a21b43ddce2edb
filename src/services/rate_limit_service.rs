use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::CounterConfig,
    error::ApiError,
    events::EventIngest,
    limiter::{
        resolver::ResolveInput, AlgorithmStrategy, CounterStore, PolicyResolver,
        RateLimitDecision,
    },
    models::{FailMode, NewRateLimitEvent, Policy, Scope},
    resilience::{with_retry, StoreGuard},
};

/// Validated hot-path request context.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub identifier: String,
    pub scope: Scope,
    pub resource: Option<String>,
    pub method: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub policy_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub requested_tokens: i64,
}

/// What the check endpoint returns. `algorithm` is the policy's algorithm,
/// `"NONE"` when no policy resolved, or `"ERROR"` when resolution itself
/// failed.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub allowed: bool,
    pub remaining: i64,
    pub limit: i64,
    pub reset_seconds: i64,
    pub retry_after: Option<i64>,
    pub policy_id: Option<Uuid>,
    pub algorithm: String,
}

/// Hot-path orchestrator: resolve the policy, run the counter under the
/// resilience layer, map failures to the policy's fail mode, and emit one
/// decision event. This path never returns an error to the caller.
pub struct RateLimitService {
    resolver: Arc<PolicyResolver>,
    store: CounterStore,
    counter_guard: StoreGuard,
    ingest: EventIngest,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl RateLimitService {
    pub fn new(
        resolver: Arc<PolicyResolver>,
        store: CounterStore,
        counter_guard: StoreGuard,
        ingest: EventIngest,
        counter_cfg: &CounterConfig,
    ) -> Self {
        Self {
            resolver,
            store,
            counter_guard,
            ingest,
            retry_attempts: counter_cfg.retry_attempts.max(1),
            retry_backoff: Duration::from_millis(counter_cfg.retry_backoff_ms),
        }
    }

    pub async fn check(&self, ctx: CheckContext) -> CheckOutcome {
        let input = ResolveInput {
            policy_id: ctx.policy_id,
            scope: ctx.scope,
            resource: ctx.resource.clone(),
            method: ctx.method.clone(),
            tenant_id: ctx.tenant_id,
            ip_address: ctx.ip_address.clone(),
        };

        let outcome = match self.resolver.resolve(&input).await {
            Ok(Some(policy)) => self.check_against_policy(&ctx, &policy).await,
            Ok(None) => {
                // NO_POLICY: nothing to count against, deny.
                CheckOutcome {
                    allowed: false,
                    remaining: 0,
                    limit: 0,
                    reset_seconds: 0,
                    retry_after: None,
                    policy_id: None,
                    algorithm: "NONE".to_string(),
                }
            }
            Err(e) => {
                tracing::error!("policy resolution failed, failing closed: {}", e);
                CheckOutcome {
                    allowed: false,
                    remaining: 0,
                    limit: 0,
                    reset_seconds: 0,
                    retry_after: None,
                    policy_id: None,
                    algorithm: "ERROR".to_string(),
                }
            }
        };

        self.ingest
            .record(NewRateLimitEvent {
                policy_id: outcome.policy_id,
                identifier: ctx.identifier.clone(),
                identifier_type: ctx.scope.into(),
                allowed: outcome.allowed,
                remaining: outcome.remaining,
                limit_value: outcome.limit,
                ip_address: ctx.ip_address,
                resource: ctx.resource,
                event_time: Utc::now(),
            })
            .await;

        outcome
    }

    async fn check_against_policy(&self, ctx: &CheckContext, policy: &Policy) -> CheckOutcome {
        // Disabled means "reject all", not "bypass" — the counter store is
        // never consulted.
        if !policy.enabled {
            return CheckOutcome {
                allowed: false,
                remaining: 0,
                limit: policy.max_requests,
                reset_seconds: 0,
                retry_after: None,
                policy_id: Some(policy.id),
                algorithm: policy.algorithm.to_string(),
            };
        }

        let strategy = AlgorithmStrategy::for_algorithm(policy.algorithm);
        // One timestamp for all attempts, so a retried sliding-log insert
        // lands on the same members and dedupes in the script.
        let now_ms = Utc::now().timestamp_millis();

        let result = with_retry(self.retry_attempts, self.retry_backoff, || {
            self.counter_guard.run(strategy.check(
                &self.store,
                policy,
                ctx.scope,
                &ctx.identifier,
                ctx.requested_tokens,
                now_ms,
            ))
        })
        .await;

        match result {
            Ok(decision) => decision_outcome(policy, decision),
            Err(e) => {
                tracing::warn!(
                    "counter unavailable for policy {} ({}), applying {}",
                    policy.id,
                    e,
                    policy.fail_mode
                );
                fail_mode_outcome(policy)
            }
        }
    }
}

fn decision_outcome(policy: &Policy, decision: RateLimitDecision) -> CheckOutcome {
    CheckOutcome {
        allowed: decision.allowed,
        remaining: decision.remaining,
        limit: policy.max_requests,
        reset_seconds: decision.reset_seconds,
        retry_after: (!decision.allowed).then_some(decision.reset_seconds),
        policy_id: Some(policy.id),
        algorithm: policy.algorithm.to_string(),
    }
}

/// FAIL_OPEN admits with a full budget; FAIL_CLOSED rejects outright. The
/// algorithm label stays the policy's own so callers can tell fail-open
/// responses from NO_POLICY denials.
fn fail_mode_outcome(policy: &Policy) -> CheckOutcome {
    match policy.fail_mode {
        FailMode::FailOpen => CheckOutcome {
            allowed: true,
            remaining: policy.max_requests,
            limit: policy.max_requests,
            reset_seconds: 0,
            retry_after: None,
            policy_id: Some(policy.id),
            algorithm: policy.algorithm.to_string(),
        },
        FailMode::FailClosed => CheckOutcome {
            allowed: false,
            remaining: 0,
            limit: policy.max_requests,
            reset_seconds: 0,
            retry_after: None,
            policy_id: Some(policy.id),
            algorithm: policy.algorithm.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Algorithm;

    fn policy(fail_mode: FailMode) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            tenant_id: None,
            name: "p".into(),
            scope: Scope::ApiKey,
            algorithm: Algorithm::TokenBucket,
            max_requests: 100,
            window_seconds: 60,
            burst_capacity: None,
            refill_rate: None,
            fail_mode,
            enabled: true,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fail_open_admits_with_full_budget() {
        let p = policy(FailMode::FailOpen);
        let outcome = fail_mode_outcome(&p);
        assert!(outcome.allowed);
        assert_eq!(outcome.remaining, 100);
        assert_eq!(outcome.reset_seconds, 0);
        assert_eq!(outcome.algorithm, "TOKEN_BUCKET");
    }

    #[test]
    fn fail_closed_rejects() {
        let p = policy(FailMode::FailClosed);
        let outcome = fail_mode_outcome(&p);
        assert!(!outcome.allowed);
        assert_eq!(outcome.remaining, 0);
    }

    #[test]
    fn denied_decisions_carry_retry_after() {
        let p = policy(FailMode::FailOpen);
        let denied = decision_outcome(
            &p,
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_seconds: 12,
            },
        );
        assert_eq!(denied.retry_after, Some(12));

        let allowed = decision_outcome(
            &p,
            RateLimitDecision {
                allowed: true,
                remaining: 5,
                reset_seconds: 30,
            },
        );
        assert_eq!(allowed.retry_after, None);
    }
}
