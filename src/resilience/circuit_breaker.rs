use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::ApiError;

/// Circuit breaker tuning. Defaults match the service-wide contract:
/// a count-based window of the last 10 calls, tripping at a 50% failure
/// rate once 5 calls have been observed.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub window_size: usize,
    pub minimum_calls: usize,
    pub failure_rate_threshold: f64,
    pub open_duration: Duration,
    pub half_open_permitted_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 50.0,
            open_duration: Duration::from_secs(5),
            half_open_permitted_calls: 3,
        }
    }
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Ring buffer over the outcomes of the last `window_size` calls.
struct OutcomeWindow {
    outcomes: Vec<bool>,
    next: usize,
    filled: usize,
}

impl OutcomeWindow {
    fn new(size: usize) -> Self {
        Self {
            outcomes: vec![false; size.max(1)],
            next: 0,
            filled: 0,
        }
    }

    fn push(&mut self, failure: bool) {
        self.outcomes[self.next] = failure;
        self.next = (self.next + 1) % self.outcomes.len();
        self.filled = (self.filled + 1).min(self.outcomes.len());
    }

    fn failure_rate(&self) -> Option<f64> {
        if self.filled == 0 {
            return None;
        }
        let failures = self.outcomes[..self.filled.min(self.outcomes.len())]
            .iter()
            .filter(|f| **f)
            .count();
        Some(failures as f64 * 100.0 / self.filled as f64)
    }

    fn reset(&mut self) {
        self.next = 0;
        self.filled = 0;
    }
}

/// Circuit breaker state machine: CLOSED → OPEN → HALF_OPEN → CLOSED.
///
/// The state byte is atomic so the hot path reads it without locking; the
/// outcome window sits behind a mutex that is only touched when recording.
/// The OPEN → HALF_OPEN transition races are settled with a CAS — exactly
/// one caller wins the first probe.
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    state: AtomicU8,
    window: Mutex<OutcomeWindow>,
    opened_at: Mutex<Option<Instant>>,
    half_open_permits: AtomicU32,
    half_open_successes: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        let window = OutcomeWindow::new(config.window_size);
        Self {
            name,
            config,
            state: AtomicU8::new(STATE_CLOSED),
            window: Mutex::new(window),
            opened_at: Mutex::new(None),
            half_open_permits: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_OPEN
    }

    /// Gate a call. `Err(CircuitOpen)` means fail immediately without
    /// touching the dependency.
    pub fn try_acquire(&self) -> Result<(), ApiError> {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => Ok(()),
            STATE_OPEN => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|at| at.elapsed())
                    .unwrap_or_default();
                if elapsed >= self.config.open_duration
                    && self
                        .state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.half_open_permits.store(1, Ordering::Release);
                    self.half_open_successes.store(0, Ordering::Release);
                    tracing::info!("circuit '{}': open -> half-open", self.name);
                    return Ok(());
                }
                Err(ApiError::CircuitOpen(self.name))
            }
            _ => {
                // HALF_OPEN: admit up to the configured number of probes.
                let permitted = self.config.half_open_permitted_calls;
                let admitted = self
                    .half_open_permits
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < permitted).then_some(n + 1)
                    });
                match admitted {
                    Ok(_) => Ok(()),
                    Err(_) => Err(ApiError::CircuitOpen(self.name)),
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => {
                self.window.lock().unwrap().push(false);
            }
            STATE_HALF_OPEN => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                let majority = self.config.half_open_permitted_calls / 2 + 1;
                if successes >= majority {
                    self.close();
                }
            }
            _ => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => {
                let mut window = self.window.lock().unwrap();
                window.push(true);
                let tripped = window.filled >= self.config.minimum_calls
                    && window
                        .failure_rate()
                        .is_some_and(|rate| rate >= self.config.failure_rate_threshold);
                drop(window);
                if tripped {
                    self.open("failure rate over threshold");
                }
            }
            STATE_HALF_OPEN => {
                // Any failed probe reopens.
                self.open("probe failed in half-open");
            }
            _ => {}
        }
    }

    fn open(&self, reason: &str) {
        self.state.store(STATE_OPEN, Ordering::Release);
        *self.opened_at.lock().unwrap() = Some(Instant::now());
        self.window.lock().unwrap().reset();
        tracing::warn!("circuit '{}': opened ({})", self.name, reason);
    }

    fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.window.lock().unwrap().reset();
        *self.opened_at.lock().unwrap() = None;
        tracing::info!("circuit '{}': closed (recovered)", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(open_ms: u64) -> BreakerConfig {
        BreakerConfig {
            window_size: 10,
            minimum_calls: 5,
            failure_rate_threshold: 50.0,
            open_duration: Duration::from_millis(open_ms),
            half_open_permitted_calls: 3,
        }
    }

    fn fail_n(breaker: &CircuitBreaker, n: usize) {
        for _ in 0..n {
            breaker.record_failure();
        }
    }

    #[test]
    fn starts_closed() {
        let b = CircuitBreaker::new("test", config(5000));
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn stays_closed_below_minimum_calls() {
        let b = CircuitBreaker::new("test", config(5000));
        fail_n(&b, 4);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn trips_at_failure_rate_threshold() {
        let b = CircuitBreaker::new("test", config(5000));
        // 3 failures / 5 calls = 60% >= 50%
        b.record_success();
        b.record_success();
        fail_n(&b, 3);
        assert!(matches!(b.try_acquire(), Err(ApiError::CircuitOpen(_))));
    }

    #[test]
    fn below_threshold_rate_does_not_trip() {
        let b = CircuitBreaker::new("test", config(5000));
        // 2 failures / 6 calls ≈ 33%
        for _ in 0..4 {
            b.record_success();
        }
        fail_n(&b, 2);
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn sliding_window_forgets_old_outcomes() {
        let b = CircuitBreaker::new("test", config(5000));
        fail_n(&b, 4);
        // 10 successes push the failures out of the window entirely.
        for _ in 0..10 {
            b.record_success();
        }
        b.record_failure();
        assert!(b.try_acquire().is_ok());
    }

    #[test]
    fn half_open_after_open_duration_then_majority_closes() {
        let b = CircuitBreaker::new("test", config(10));
        fail_n(&b, 5);
        assert!(matches!(b.try_acquire(), Err(ApiError::CircuitOpen(_))));

        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire().is_ok()); // first probe
        assert!(b.try_acquire().is_ok());
        b.record_success();
        b.record_success(); // majority of 3
        assert!(b.try_acquire().is_ok());
        assert!(!b.is_open());
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = CircuitBreaker::new("test", config(10));
        fail_n(&b, 5);
        std::thread::sleep(Duration::from_millis(20));
        assert!(b.try_acquire().is_ok());
        b.record_failure();
        assert!(b.is_open());
        assert!(matches!(b.try_acquire(), Err(ApiError::CircuitOpen(_))));
    }

    #[test]
    fn half_open_limits_probe_count() {
        let b = CircuitBreaker::new("test", config(10));
        fail_n(&b, 5);
        std::thread::sleep(Duration::from_millis(20));

        assert!(b.try_acquire().is_ok());
        assert!(b.try_acquire().is_ok());
        assert!(b.try_acquire().is_ok());
        assert!(matches!(b.try_acquire(), Err(ApiError::CircuitOpen(_))));
    }
}
