use std::time::Duration;

use crate::error::ApiError;
use crate::limiter::RateLimitDecision;
use crate::models::{Algorithm, Scope};

/// Identifiers above this length are rejected before any I/O to keep the
/// counter key space bounded.
pub const MAX_IDENTIFIER_BYTES: usize = 255;

/// Redis scripts for atomic counter operations. Each script performs the
/// full read-modify-write for one algorithm server-side and returns
/// `{allowed, remaining, reset_seconds}`.
///
/// `redis::Script` invokes via EVALSHA and transparently re-uploads the
/// source on NOSCRIPT, so a store that loses its script cache heals on the
/// next call.
mod scripts {
    use redis::Script;

    /// Token bucket over a HASH of `{tokens, last_refill_ms}`.
    ///
    /// ARGV: capacity, refill_rate (tokens/sec), now_ms, cost, ttl_seconds.
    pub fn token_bucket() -> Script {
        Script::new(
            r#"
            local capacity = tonumber(ARGV[1])
            local refill_rate = tonumber(ARGV[2])
            local now_ms = tonumber(ARGV[3])
            local cost = tonumber(ARGV[4])
            local ttl = tonumber(ARGV[5])

            local state = redis.call('HMGET', KEYS[1], 'tokens', 'last_refill_ms')
            local tokens = tonumber(state[1])
            local last_refill = tonumber(state[2])
            if tokens == nil or last_refill == nil then
                tokens = capacity
                last_refill = now_ms
            end

            local elapsed_ms = math.max(0, now_ms - last_refill)
            tokens = math.min(capacity, tokens + elapsed_ms / 1000 * refill_rate)

            local allowed = 0
            if tokens >= cost then
                allowed = 1
                tokens = tokens - cost
            end

            redis.call('HMSET', KEYS[1], 'tokens', tokens, 'last_refill_ms', now_ms)
            redis.call('EXPIRE', KEYS[1], ttl)

            local reset
            if allowed == 1 then
                reset = math.ceil((capacity - tokens) / refill_rate)
            else
                reset = math.ceil((cost - tokens) / refill_rate)
            end
            return {allowed, math.floor(tokens), reset}
            "#,
        )
    }

    /// Fixed window over a plain counter. The window-epoch suffix is
    /// appended here so concurrent callers in the same window INCR the same
    /// key and a new window starts from a fresh key.
    ///
    /// ARGV: max_requests, window_seconds, now_s, cost.
    pub fn fixed_window() -> Script {
        Script::new(
            r#"
            local max_requests = tonumber(ARGV[1])
            local window = tonumber(ARGV[2])
            local now_s = tonumber(ARGV[3])
            local cost = tonumber(ARGV[4])

            local epoch = math.floor(now_s / window)
            local key = KEYS[1] .. ':' .. epoch

            local count = redis.call('INCRBY', key, cost)
            if count == cost then
                redis.call('EXPIRE', key, window)
            end

            local allowed = 0
            if count <= max_requests then
                allowed = 1
            end
            return {allowed, math.max(0, max_requests - count), window - (now_s % window)}
            "#,
        )
    }

    /// Sliding log over a sorted set of millisecond timestamps. Members are
    /// derived from the caller-supplied now_ms, so a retried call with the
    /// same timestamp overwrites instead of double-counting.
    ///
    /// ARGV: max_requests, window_ms, now_ms, cost, ttl_seconds.
    pub fn sliding_log() -> Script {
        Script::new(
            r#"
            local max_requests = tonumber(ARGV[1])
            local window_ms = tonumber(ARGV[2])
            local now_ms = tonumber(ARGV[3])
            local cost = tonumber(ARGV[4])
            local ttl = tonumber(ARGV[5])

            redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, now_ms - window_ms)
            local count = redis.call('ZCARD', KEYS[1])

            if count + cost <= max_requests then
                for i = 1, cost do
                    redis.call('ZADD', KEYS[1], now_ms, now_ms .. '-' .. i)
                end
                redis.call('EXPIRE', KEYS[1], ttl)
                return {1, max_requests - (count + cost), math.floor(window_ms / 1000)}
            end

            redis.call('EXPIRE', KEYS[1], ttl)
            local reset = math.ceil(window_ms / 1000)
            local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
            if oldest[2] then
                reset = math.ceil((tonumber(oldest[2]) + window_ms - now_ms) / 1000)
            end
            return {0, math.max(0, max_requests - count), math.max(0, reset)}
            "#,
        )
    }
}

/// Counter store adapter: atomic script execution against Redis with a
/// per-call timeout. Stateless apart from the connection handle — counter
/// state lives exclusively in the store.
///
/// Callers never retry here; retries and circuit breaking are the
/// resilience layer's job.
#[derive(Clone)]
pub struct CounterStore {
    redis: redis::aio::ConnectionManager,
    call_timeout: Duration,
}

impl CounterStore {
    pub fn new(redis: redis::aio::ConnectionManager, call_timeout: Duration) -> Self {
        Self {
            redis,
            call_timeout,
        }
    }

    /// Counter key: `rl:{algo_tag}:{scope_lowercase}:{identifier}`. The
    /// fixed-window script appends its epoch suffix internally.
    pub fn build_key(algorithm: Algorithm, scope: Scope, identifier: &str) -> String {
        format!(
            "rl:{}:{}:{}",
            algorithm.key_tag(),
            scope.key_segment(),
            identifier
        )
    }

    /// Bound and sanity-check an identifier before it becomes a key
    /// segment. ASCII-only, length-capped, no control characters.
    pub fn validate_identifier(identifier: &str) -> Result<(), ApiError> {
        if identifier.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "identifier must not be blank".to_string(),
            ));
        }
        if identifier.len() > MAX_IDENTIFIER_BYTES {
            return Err(ApiError::InvalidInput(format!(
                "identifier exceeds {} bytes",
                MAX_IDENTIFIER_BYTES
            )));
        }
        if !identifier.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ApiError::InvalidInput(
                "identifier must be printable ASCII".to_string(),
            ));
        }
        Ok(())
    }

    /// Execute one algorithm script against `key` with the argument vector
    /// built by the strategy layer.
    ///
    /// Any transport error or timeout maps to `StoreUnavailable`; a reply
    /// that is not a 3-tuple of non-negative integers maps to
    /// `ScriptError` (which callers treat the same way).
    pub async fn execute(
        &self,
        algorithm: Algorithm,
        key: &str,
        argv: &[String],
    ) -> Result<RateLimitDecision, ApiError> {
        let script = match algorithm {
            Algorithm::TokenBucket => scripts::token_bucket(),
            Algorithm::FixedWindow => scripts::fixed_window(),
            Algorithm::SlidingLog => scripts::sliding_log(),
        };

        let mut conn = self.redis.clone();
        let mut invocation = script.key(key);
        for arg in argv {
            invocation.arg(arg);
        }

        let reply = tokio::time::timeout(
            self.call_timeout,
            invocation.invoke_async::<Vec<i64>>(&mut conn),
        )
        .await
        .map_err(|_| {
            ApiError::StoreUnavailable(format!(
                "counter call exceeded {}ms",
                self.call_timeout.as_millis()
            ))
        })?
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))?;

        parse_reply(&reply)
    }
}

fn parse_reply(reply: &[i64]) -> Result<RateLimitDecision, ApiError> {
    if reply.len() != 3 || reply.iter().any(|v| *v < 0) || !(0..=1).contains(&reply[0]) {
        return Err(ApiError::ScriptError(format!(
            "expected {{allowed, remaining, reset}} tuple, got {:?}",
            reply
        )));
    }
    Ok(RateLimitDecision {
        allowed: reply[0] == 1,
        remaining: reply[1],
        reset_seconds: reply[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(
            CounterStore::build_key(Algorithm::TokenBucket, Scope::ApiKey, "ak_123"),
            "rl:tb:api_key:ak_123"
        );
        assert_eq!(
            CounterStore::build_key(Algorithm::SlidingLog, Scope::Ip, "10.0.0.1"),
            "rl:sl:ip:10.0.0.1"
        );
    }

    #[test]
    fn oversize_identifier_is_rejected() {
        let long = "x".repeat(MAX_IDENTIFIER_BYTES + 1);
        assert!(matches!(
            CounterStore::validate_identifier(&long),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(CounterStore::validate_identifier(&"x".repeat(MAX_IDENTIFIER_BYTES)).is_ok());
    }

    #[test]
    fn non_ascii_and_blank_identifiers_are_rejected() {
        assert!(CounterStore::validate_identifier("  ").is_err());
        assert!(CounterStore::validate_identifier("user café").is_err());
        assert!(CounterStore::validate_identifier("user-42").is_ok());
    }

    #[test]
    fn malformed_replies_are_script_errors() {
        assert!(matches!(
            parse_reply(&[1, 2]),
            Err(ApiError::ScriptError(_))
        ));
        assert!(matches!(
            parse_reply(&[1, -1, 0]),
            Err(ApiError::ScriptError(_))
        ));
        assert!(matches!(
            parse_reply(&[7, 1, 0]),
            Err(ApiError::ScriptError(_))
        ));

        let ok = parse_reply(&[1, 9, 60]).unwrap();
        assert!(ok.allowed);
        assert_eq!(ok.remaining, 9);
        assert_eq!(ok.reset_seconds, 60);
    }
}
