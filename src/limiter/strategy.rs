use crate::error::ApiError;
use crate::limiter::store::CounterStore;
use crate::limiter::RateLimitDecision;
use crate::models::{Algorithm, Policy, Scope};

/// Stateless strategy value for one counting algorithm. Dispatched by the
/// `Algorithm` tag — no trait objects on the hot path. Each call validates
/// the effective policy parameters, marshals them into the script argument
/// vector and hands execution to the counter store.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmStrategy {
    algorithm: Algorithm,
}

impl AlgorithmStrategy {
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Reject policies whose effective parameters cannot drive this
    /// algorithm. Defaults are applied first (burst = max_requests,
    /// refill = max_requests / window_seconds), so a rejection here means
    /// the stored policy itself is unusable.
    pub fn validate(&self, policy: &Policy, cost: i64) -> Result<(), ApiError> {
        if policy.max_requests <= 0 {
            return Err(ApiError::InvalidInput(
                "max_requests must be positive".to_string(),
            ));
        }
        if policy.window_seconds <= 0 {
            return Err(ApiError::InvalidInput(
                "window_seconds must be positive".to_string(),
            ));
        }
        if cost < 1 {
            return Err(ApiError::InvalidInput(
                "requested_tokens must be at least 1".to_string(),
            ));
        }
        if self.algorithm == Algorithm::TokenBucket {
            if policy.effective_burst() <= 0 {
                return Err(ApiError::InvalidInput(
                    "burst_capacity must be positive".to_string(),
                ));
            }
            if policy.effective_refill_rate() <= 0.0 {
                return Err(ApiError::InvalidInput(
                    "refill_rate must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Script argument vector, stringly-typed for the script engine. The
    /// caller supplies the clock so retries replay the same timestamp.
    pub fn argv(&self, policy: &Policy, cost: i64, now_ms: i64) -> Vec<String> {
        let ttl = policy.window_seconds * 2;
        match self.algorithm {
            Algorithm::TokenBucket => vec![
                policy.effective_burst().to_string(),
                policy.effective_refill_rate().to_string(),
                now_ms.to_string(),
                cost.to_string(),
                ttl.to_string(),
            ],
            Algorithm::FixedWindow => vec![
                policy.max_requests.to_string(),
                policy.window_seconds.to_string(),
                (now_ms / 1000).to_string(),
                cost.to_string(),
            ],
            Algorithm::SlidingLog => vec![
                policy.max_requests.to_string(),
                (policy.window_seconds * 1000).to_string(),
                now_ms.to_string(),
                cost.to_string(),
                ttl.to_string(),
            ],
        }
    }

    /// Validate, build the key and argument vector, and execute atomically
    /// against the counter store.
    pub async fn check(
        &self,
        store: &CounterStore,
        policy: &Policy,
        scope: Scope,
        identifier: &str,
        cost: i64,
        now_ms: i64,
    ) -> Result<RateLimitDecision, ApiError> {
        self.validate(policy, cost)?;
        CounterStore::validate_identifier(identifier)?;

        let key = CounterStore::build_key(self.algorithm, scope, identifier);
        let argv = self.argv(policy, cost, now_ms);
        store.execute(self.algorithm, &key, &argv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailMode;
    use chrono::Utc;
    use uuid::Uuid;

    fn policy(algorithm: Algorithm) -> Policy {
        Policy {
            id: Uuid::new_v4(),
            tenant_id: None,
            name: "p".into(),
            scope: Scope::ApiKey,
            algorithm,
            max_requests: 10,
            window_seconds: 60,
            burst_capacity: None,
            refill_rate: None,
            fail_mode: FailMode::FailOpen,
            enabled: true,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_bucket_argv_applies_defaults() {
        let p = policy(Algorithm::TokenBucket);
        let argv = AlgorithmStrategy::for_algorithm(Algorithm::TokenBucket).argv(&p, 1, 1_000_000);

        assert_eq!(argv[0], "10");
        assert_eq!(argv[1], (10.0f64 / 60.0).to_string());
        assert_eq!(argv[2], "1000000");
        assert_eq!(argv[3], "1");
        assert_eq!(argv[4], "120");
    }

    #[test]
    fn fixed_window_argv_uses_seconds() {
        let p = policy(Algorithm::FixedWindow);
        let argv = AlgorithmStrategy::for_algorithm(Algorithm::FixedWindow).argv(&p, 2, 90_500);

        assert_eq!(argv, vec!["10", "60", "90", "2"]);
    }

    #[test]
    fn sliding_log_argv_uses_millis() {
        let p = policy(Algorithm::SlidingLog);
        let argv = AlgorithmStrategy::for_algorithm(Algorithm::SlidingLog).argv(&p, 1, 5_000);

        assert_eq!(argv, vec!["10", "60000", "5000", "1", "120"]);
    }

    #[test]
    fn non_positive_params_are_rejected() {
        let mut p = policy(Algorithm::TokenBucket);
        let strategy = AlgorithmStrategy::for_algorithm(Algorithm::TokenBucket);

        p.refill_rate = Some(0.0);
        assert!(strategy.validate(&p, 1).is_err());

        p.refill_rate = None;
        p.burst_capacity = Some(0);
        assert!(strategy.validate(&p, 1).is_err());

        p.burst_capacity = None;
        assert!(strategy.validate(&p, 0).is_err());
        assert!(strategy.validate(&p, 1).is_ok());
    }
}
