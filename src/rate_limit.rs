use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::Id;

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            enabled,
        }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env. Only report creation is limited;
/// reads and admin operations are not.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub report_limit: usize,
    pub report_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(
                std::env::var(name)
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default),
            )
        }
        Self {
            report_limit: usize_env("RL_REPORT_LIMIT", 5),
            report_window: dur_env("RL_REPORT_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers. Keyed by reporter id, not client IP,
/// so a reporter cannot dodge the cap by switching networks.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    pub fn allow_report(&self, reporter_id: Id) -> bool {
        self.limiter.check(
            &format!("report:{reporter_id}"),
            self.cfg.report_limit,
            self.cfg.report_window,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 {
            assert!(rl.check("k", 3, window));
        }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let facade = RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig {
                report_limit: 1,
                report_window: Duration::from_secs(60),
            },
        );
        assert!(facade.allow_report(9));
        assert!(facade.allow_report(9));
    }
}
