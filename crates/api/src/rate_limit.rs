//! Per-connection rate limiting for real-time events.
//!
//! Each action category (join, vote) has its own sliding-window limiter,
//! keyed by connection id. Stale keys are pruned on every check, so no
//! background sweeper is needed.

#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use livepoll_common::config::LimitsConfig;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Rate limit configuration for one action category.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum attempts per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limit check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Attempt recorded.
    Allowed {
        /// Attempts left in the current window.
        remaining: u32,
        limit: u32,
    },
    /// Attempt refused and not recorded.
    Limited {
        /// Whole seconds until the oldest attempt leaves the window.
        retry_after: u64,
        limit: u32,
    },
}

impl RateLimitResult {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Sliding-window limiter.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    /// Attempt timestamps per key, oldest first.
    states: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check an attempt for `key` and record it if allowed.
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let mut states = self.states.write().await;
        let now = Instant::now();
        let window = self.config.window();
        let limit = self.config.max_requests;

        // Drop every key whose whole history has left the window.
        states.retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|last| now.duration_since(*last) < window)
        });

        let attempts = states.entry(key.to_string()).or_default();
        while attempts
            .front()
            .is_some_and(|first| now.duration_since(*first) >= window)
        {
            attempts.pop_front();
        }

        if attempts.len() >= limit as usize {
            let oldest = attempts.front().copied().unwrap_or(now);
            let wait = window.saturating_sub(now.duration_since(oldest));
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            if attempts.is_empty() {
                states.remove(key);
            }
            return RateLimitResult::Limited {
                retry_after: retry_after.max(1),
                limit,
            };
        }

        attempts.push_back(now);
        RateLimitResult::Allowed {
            remaining: limit - attempts.len() as u32,
            limit,
        }
    }

    /// Forget a key, e.g. when its connection ends.
    pub async fn forget(&self, key: &str) {
        self.states.write().await.remove(key);
    }

    /// Number of tracked keys.
    pub async fn key_count(&self) -> usize {
        self.states.read().await.len()
    }
}

/// The limiters for every real-time action category.
#[derive(Clone)]
pub struct RateLimiterState {
    pub join: SlidingWindowLimiter,
    pub vote: SlidingWindowLimiter,
}

impl RateLimiterState {
    #[must_use]
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            join: SlidingWindowLimiter::new(RateLimitConfig::new(
                limits.join_max,
                limits.join_window_secs,
            )),
            vote: SlidingWindowLimiter::new(RateLimitConfig::new(
                limits.vote_max,
                limits.vote_window_secs,
            )),
        }
    }

    /// Forget a connection in every category.
    pub async fn forget(&self, key: &str) {
        self.join.forget(key).await;
        self.vote.forget(key).await;
    }
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(&LimitsConfig::default())
    }
}
