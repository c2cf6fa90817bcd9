//! Tracks a host API's remaining-quota headers and paces outbound calls.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

const MAX_WAIT_SECS: u64 = 60;

/// Process-wide rate-limit state for one host. Cheap to clone (an `Arc`
/// internally would also work; kept as plain atomics since the governor
/// itself is usually held behind one `Arc` by its owner).
#[derive(Debug)]
pub struct RateLimitGovernor {
    remaining: AtomicI64,
    limit: AtomicI64,
    reset_at: AtomicI64,
    last_wait: AtomicU64,
}

impl Default for RateLimitGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitGovernor {
    pub fn new() -> Self {
        RateLimitGovernor {
            remaining: AtomicI64::new(i64::MAX),
            limit: AtomicI64::new(i64::MAX),
            reset_at: AtomicI64::new(0),
            last_wait: AtomicU64::new(0),
        }
    }

    /// Parses `x-ratelimit-{remaining,limit,reset}`-style headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(v) = header_i64(headers, "x-ratelimit-remaining") {
            self.remaining.store(v, Ordering::SeqCst);
        }
        if let Some(v) = header_i64(headers, "x-ratelimit-limit") {
            self.limit.store(v, Ordering::SeqCst);
        }
        if let Some(v) = header_i64(headers, "x-ratelimit-reset") {
            self.reset_at.store(v, Ordering::SeqCst);
        }
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn should_slow_down(&self) -> bool {
        let r = self.remaining();
        r > 0 && r < 500
    }

    pub fn is_critical(&self) -> bool {
        self.remaining() <= 100
    }

    /// Sleeps until `resetAt` when the quota is nearly exhausted, capped at
    /// `MAX_WAIT_SECS`. Taken at face value — no clock-drift correction.
    pub async fn wait_if_needed(&self) {
        if !self.is_critical() {
            return;
        }

        let now = now_unix();
        let last_wait = self.last_wait.load(Ordering::SeqCst);
        if now.saturating_sub(last_wait) < MAX_WAIT_SECS {
            return;
        }

        let reset_at = self.reset_at.load(Ordering::SeqCst);
        let wait_secs = (reset_at - now as i64).max(0) as u64;
        let wait_secs = wait_secs.min(MAX_WAIT_SECS);
        if wait_secs > 0 {
            warn!(wait_secs, "rate limit near exhaustion, pausing");
            self.last_wait.store(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        } else {
            debug!("rate limit critical but reset already elapsed");
        }
    }
}

fn header_i64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_governor_is_not_critical() {
        let g = RateLimitGovernor::new();
        assert!(!g.is_critical());
        assert!(!g.should_slow_down());
    }

    #[test]
    fn parses_headers_and_flags_critical() {
        let g = RateLimitGovernor::new();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "50".parse().unwrap());
        headers.insert("x-ratelimit-limit", "5000".parse().unwrap());
        headers.insert("x-ratelimit-reset", "0".parse().unwrap());
        g.update_from_headers(&headers);
        assert_eq!(g.remaining(), 50);
        assert!(g.is_critical());
    }
}
