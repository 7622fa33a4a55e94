//! Per-session request rate limiting.
//!
//! Sliding window: each session keeps the timestamps of its counted requests
//! and is refused once the window already holds `max_requests` of them.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct RateLimitEntry {
    requests: Vec<Instant>,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Drop requests that fell out of the window.
    fn prune(&mut self, window: Duration) {
        let now = Instant::now();
        self.requests
            .retain(|t| now.saturating_duration_since(*t) < window);
    }

    fn is_rate_limited(&self, max_requests: u32) -> bool {
        self.requests.len() >= max_requests as usize
    }
}

/// Thread-safe sliding-window limiter keyed by session ID.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
    last_cleanup: RwLock<Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            last_cleanup: RwLock::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request for `session_id`.
    ///
    /// Returns `true` if allowed, `false` if rate limited. Refused requests
    /// are not counted.
    pub fn check_request(&self, session_id: &str) -> bool {
        self.maybe_cleanup();

        let mut entries = self.entries.write();
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(RateLimitEntry::new);

        entry.prune(self.config.window);

        if entry.is_rate_limited(self.config.max_requests) {
            return false;
        }

        entry.requests.push(Instant::now());
        true
    }

    /// Requests still allowed in the current window.
    pub fn remaining(&self, session_id: &str) -> u32 {
        let mut entries = self.entries.write();
        match entries.get_mut(session_id) {
            Some(entry) => {
                entry.prune(self.config.window);
                self.config
                    .max_requests
                    .saturating_sub(entry.requests.len() as u32)
            }
            None => self.config.max_requests,
        }
    }

    /// Drop all state for a session (on logout or expiry).
    pub fn forget(&self, session_id: &str) {
        self.entries.write().remove(session_id);
    }

    /// Remove idle entries every 5 minutes.
    fn maybe_cleanup(&self) {
        const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

        let should_cleanup = {
            let last = self.last_cleanup.read();
            last.elapsed() > CLEANUP_INTERVAL
        };

        if should_cleanup {
            let mut entries = self.entries.write();
            let mut last = self.last_cleanup.write();

            // Double-check after acquiring write lock
            if last.elapsed() > CLEANUP_INTERVAL {
                entries.retain(|_, entry| {
                    entry.prune(self.config.window);
                    !entry.requests.is_empty()
                });
                *last = Instant::now();
            }
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        let entries = self.entries.read();
        RateLimitStats {
            tracked_sessions: entries.len(),
            max_requests: self.config.max_requests,
            window_secs: self.config.window.as_secs(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimitStats {
    pub tracked_sessions: usize,
    pub max_requests: u32,
    pub window_secs: u64,
}
