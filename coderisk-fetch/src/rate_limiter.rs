//! Adaptive token-bucket rate limiter (spec §4.1 "Rate-limit discipline").
//!
//! A single shared bucket per external provider (spec §5 "The rate limiter
//! is a shared token bucket... with a mutex around token accounting");
//! `RateLimiter` is the owned resource an orchestrator acquires/releases
//! rather than an ambient global (spec §9).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Base target: ~86% of a 5,000/hour primary quota (spec §4.1).
pub const DEFAULT_TARGET_RPS: f64 = 1.18;

/// Below this many remaining requests, halve the effective rate.
const HALVE_THRESHOLD: u32 = 500;
/// Below this many remaining requests, quarter the effective rate.
const QUARTER_THRESHOLD: u32 = 100;

struct State {
    /// Tokens available right now.
    tokens: f64,
    last_refill: Instant,
    /// Current effective rate, after any halving/quartering adjustment.
    effective_rps: f64,
}

pub struct RateLimiter {
    base_rps: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(target_rps: f64) -> Self {
        Self {
            base_rps: target_rps,
            state: Mutex::new(State { tokens: 1.0, last_refill: Instant::now(), effective_rps: target_rps }),
        }
    }

    /// Acquire one token, sleeping as necessary to respect the current
    /// effective rate. Call this once per outbound request (spec §5: every
    /// outbound HTTP call is a suspension point).
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * state.effective_rps).min(1.0);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / state.effective_rps))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    /// Observe a response's remaining-quota header (spec §4.1: "Observe
    /// remaining-quota and reset-time headers after each response") and
    /// adjust the effective rate accordingly. Idempotent — calling this
    /// repeatedly with a steady `remaining` value converges, it doesn't
    /// compound.
    pub fn observe_remaining(&self, remaining: u32) {
        let mut state = self.state.lock().unwrap();
        let new_rate = if remaining < QUARTER_THRESHOLD {
            self.base_rps / 4.0
        } else if remaining < HALVE_THRESHOLD {
            self.base_rps / 2.0
        } else {
            self.base_rps
        };
        if (new_rate - state.effective_rps).abs() > f64::EPSILON {
            debug!(remaining, old_rps = state.effective_rps, new_rps = new_rate, "adjusting rate limit");
            if new_rate < state.effective_rps {
                warn!(remaining, new_rps = new_rate, "lowering request rate under quota pressure");
            }
            state.effective_rps = new_rate;
        }
    }

    pub fn effective_rps(&self) -> f64 {
        self.state.lock().unwrap().effective_rps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observing_low_remaining_halves_then_quarters_rate() {
        let limiter = RateLimiter::new(DEFAULT_TARGET_RPS);
        assert!((limiter.effective_rps() - DEFAULT_TARGET_RPS).abs() < 1e-9);

        limiter.observe_remaining(400);
        assert!((limiter.effective_rps() - DEFAULT_TARGET_RPS / 2.0).abs() < 1e-9);

        limiter.observe_remaining(50);
        assert!((limiter.effective_rps() - DEFAULT_TARGET_RPS / 4.0).abs() < 1e-9);
    }

    #[test]
    fn observing_healthy_remaining_restores_base_rate() {
        let limiter = RateLimiter::new(DEFAULT_TARGET_RPS);
        limiter.observe_remaining(50);
        limiter.observe_remaining(4000);
        assert!((limiter.effective_rps() - DEFAULT_TARGET_RPS).abs() < 1e-9);
    }

    #[tokio::test]
    async fn acquire_serializes_bursts_to_the_target_rate() {
        let limiter = RateLimiter::new(20.0); // fast for a deterministic test
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // 3 acquisitions at 20rps should take at least ~2/20s (first is free).
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
