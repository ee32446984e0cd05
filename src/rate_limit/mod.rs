//! Fixed-window request rate limiting with a cooldown block.
//!
//! Every client key owns a window of recent hit timestamps. Exceeding the
//! quota blocks the key for a cooldown period; once the cooldown passes the
//! window starts over from zero.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

pub mod guards;

pub use guards::{ApiRateLimit, AuthRateLimit, RateLimitHeaders};

/// A limit of `limit` hits per `window`, with a `block` cooldown once
/// exceeded.
#[derive(Debug, Clone, Copy)]
pub struct RateQuota {
    pub limit: usize,
    pub window: Duration,
    pub block: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub api_limit: usize,
    pub api_window_secs: i64,
    pub auth_limit: usize,
    pub auth_window_secs: i64,
    pub block_secs: i64,
    pub disabled: bool,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let disabled = std::env::var("CESIZEN_DISABLE_RATE_LIMIT")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);

        Self {
            api_limit: env_parse("CESIZEN_RATE_LIMIT", 1000),
            api_window_secs: env_parse("CESIZEN_RATE_WINDOW_SECS", 3600),
            auth_limit: env_parse("CESIZEN_AUTH_RATE_LIMIT", 10),
            auth_window_secs: env_parse("CESIZEN_AUTH_RATE_WINDOW_SECS", 900),
            block_secs: env_parse("CESIZEN_RATE_BLOCK_SECS", 600),
            disabled,
        }
    }

    /// General quota for authenticated API traffic, keyed by client IP.
    pub fn api_quota(&self) -> RateQuota {
        RateQuota {
            limit: self.api_limit,
            window: Duration::seconds(self.api_window_secs),
            block: Duration::seconds(self.block_secs),
        }
    }

    /// Tighter quota for credential endpoints, keyed by IP and path.
    pub fn auth_quota(&self) -> RateQuota {
        RateQuota {
            limit: self.auth_limit,
            window: Duration::seconds(self.auth_window_secs),
            block: Duration::seconds(self.block_secs),
        }
    }

    /// Upper bound on how long any entry can stay relevant. The sweeper
    /// drops entries older than this.
    pub fn max_window(&self) -> Duration {
        let window = self.api_window_secs.max(self.auth_window_secs);
        Duration::seconds(window + self.block_secs)
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    hits: VecDeque<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

/// Point-in-time view of one key's window, used for response headers.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
    pub reset_at: i64,
    pub retry_after: Option<i64>,
    pub window_secs: i64,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allowed(&self, key: &str, quota: RateQuota) -> bool {
        self.is_allowed_at(key, quota, Utc::now())
    }

    /// Record a hit for `key` at `now` and decide whether it may proceed.
    /// A hit that lands while the key is blocked is not recorded.
    pub fn is_allowed_at(&self, key: &str, quota: RateQuota, now: DateTime<Utc>) -> bool {
        let mut window = self.windows.entry(key.to_string()).or_default();

        if let Some(blocked_until) = window.blocked_until {
            if now < blocked_until {
                return false;
            }
            // Cooldown over: the old hits do not carry into the new window,
            // otherwise the key would be re-blocked on its first request.
            window.blocked_until = None;
            window.hits.clear();
        }

        let cutoff = now - quota.window;
        while window.hits.front().is_some_and(|hit| *hit <= cutoff) {
            window.hits.pop_front();
        }

        if window.hits.len() >= quota.limit {
            window.blocked_until = Some(now + quota.block);
            return false;
        }

        window.hits.push_back(now);
        true
    }

    pub fn info(&self, key: &str, quota: RateQuota) -> RateLimitInfo {
        self.info_at(key, quota, Utc::now())
    }

    pub fn info_at(&self, key: &str, quota: RateQuota, now: DateTime<Utc>) -> RateLimitInfo {
        let window_secs = quota.window.num_seconds();
        let Some(window) = self.windows.get(key) else {
            return RateLimitInfo {
                limit: quota.limit,
                remaining: quota.limit,
                reset_at: (now + quota.window).timestamp(),
                retry_after: None,
                window_secs,
            };
        };

        if let Some(blocked_until) = window.blocked_until {
            if now < blocked_until {
                return RateLimitInfo {
                    limit: quota.limit,
                    remaining: 0,
                    reset_at: blocked_until.timestamp(),
                    retry_after: Some((blocked_until - now).num_seconds().max(1)),
                    window_secs,
                };
            }
        }

        let cutoff = now - quota.window;
        let active = window.hits.iter().filter(|hit| **hit > cutoff).count();
        let reset_at = window
            .hits
            .iter()
            .find(|hit| **hit > cutoff)
            .map(|oldest| *oldest + quota.window)
            .unwrap_or(now + quota.window)
            .timestamp();

        RateLimitInfo {
            limit: quota.limit,
            remaining: quota.limit.saturating_sub(active),
            reset_at,
            retry_after: None,
            window_secs,
        }
    }

    pub fn sweep(&self, max_window: Duration) {
        self.sweep_at(Utc::now(), max_window)
    }

    /// Drop entries with nothing left to remember: no live block and no
    /// hit younger than `max_window`.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_window: Duration) {
        let cutoff = now - max_window;
        self.windows.retain(|_, window| {
            if window.blocked_until.is_some_and(|until| until <= now) {
                window.blocked_until = None;
                window.hits.clear();
            }
            while window.hits.front().is_some_and(|hit| *hit <= cutoff) {
                window.hits.pop_front();
            }
            window.blocked_until.is_some() || !window.hits.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub config: RateLimitConfig,
    pub limiter: Arc<RateLimiter>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiter: Arc::new(RateLimiter::new()),
        }
    }
}
