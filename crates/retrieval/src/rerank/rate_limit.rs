//! Sliding-window rate limiter for the paid reranker tier
//!
//! Tracks request count and accumulated cost over the past hour. State is
//! serialized behind a mutex: correctness over throughput.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use memsearch_core::{RateLimitKind, Result, SearchError};

const WINDOW: Duration = Duration::from_secs(3600);

/// Current window usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitUsage {
    pub requests_used: u32,
    pub cost_used_cents: f64,
    pub max_requests: u32,
    pub budget_cents: f64,
}

/// Hourly sliding-window limiter over request count and cost.
pub struct HourlyRateLimiter {
    max_requests: u32,
    budget_cents: f64,
    entries: Mutex<VecDeque<(Instant, f64)>>,
}

impl HourlyRateLimiter {
    pub fn new(max_requests: u32, budget_cents: f64) -> Self {
        Self {
            max_requests,
            budget_cents,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Check both caps and record the call if admitted.
    ///
    /// Raises `RateLimitExceeded` with the exceeded cap and the seconds until
    /// the oldest window entry expires.
    pub fn check_and_record(&self, cost_cents: f64) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        while let Some((at, _)) = entries.front() {
            if now.duration_since(*at) >= WINDOW {
                entries.pop_front();
            } else {
                break;
            }
        }

        let retry_after_s = entries
            .front()
            .map(|(at, _)| WINDOW.saturating_sub(now.duration_since(*at)).as_secs())
            .unwrap_or(0);

        if entries.len() as u32 >= self.max_requests {
            return Err(SearchError::RateLimitExceeded {
                kind: RateLimitKind::Requests,
                retry_after_s,
            });
        }

        let cost_used: f64 = entries.iter().map(|(_, c)| c).sum();
        if cost_used + cost_cents > self.budget_cents {
            return Err(SearchError::RateLimitExceeded {
                kind: RateLimitKind::Budget,
                retry_after_s,
            });
        }

        entries.push_back((now, cost_cents));
        Ok(())
    }

    /// Snapshot of the current window.
    pub fn usage(&self) -> RateLimitUsage {
        let now = Instant::now();
        let entries = self.entries.lock();
        let live: Vec<&(Instant, f64)> = entries
            .iter()
            .filter(|(at, _)| now.duration_since(*at) < WINDOW)
            .collect();
        RateLimitUsage {
            requests_used: live.len() as u32,
            cost_used_cents: live.iter().map(|(_, c)| c).sum(),
            max_requests: self.max_requests,
            budget_cents: self.budget_cents,
        }
    }

    /// Drop all recorded usage.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}
