//! Per-domain request pacing.
//!
//! One scheduler is shared by every task of a run. Each acquisition reserves
//! the next free slot for the URL's domain under the lock, then sleeps until
//! that slot outside it, so concurrent callers queue up `interval` apart
//! instead of bursting.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::validator::site_key;

#[derive(Debug, Default)]
struct SchedulerState {
    /// Earliest instant the next request to a domain may start
    next_slot: HashMap<String, Instant>,

    /// Start of the latest slot handed out per domain
    last_slot: HashMap<String, Instant>,

    /// Per-domain interval overrides (robots.txt crawl-delay)
    intervals: HashMap<String, Duration>,
}

/// Enforces a minimum interval between request starts to the same domain.
#[derive(Debug)]
pub struct RequestScheduler {
    default_interval: Duration,
    state: Mutex<SchedulerState>,
}

impl RequestScheduler {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Raise the interval for the URL's domain. Never lowers it below the default.
    ///
    /// The next reservation is re-spaced from the latest slot already handed
    /// out, so the new interval applies to the very next request.
    pub async fn set_interval(&self, url: &Url, interval: Duration) {
        let interval = interval.max(self.default_interval);
        let key = site_key(url);
        debug!(domain = %key, interval_ms = interval.as_millis() as u64, "Domain interval set");

        let mut state = self.state.lock().await;
        if let Some(last) = state.last_slot.get(&key).copied() {
            if let Some(next) = last.checked_add(interval) {
                state.next_slot.insert(key.clone(), next);
            }
        }
        state.intervals.insert(key, interval);
    }

    /// Interval currently applied to the URL's domain.
    pub async fn interval_for(&self, url: &Url) -> Duration {
        self.state
            .lock()
            .await
            .intervals
            .get(&site_key(url))
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Wait for this domain's next slot.
    ///
    /// Returns `Err(FetchError::Cancelled)` if `cancel` fires first. A slot
    /// reserved by a cancelled waiter is not handed back.
    pub async fn acquire(&self, url: &Url, cancel: &CancellationToken) -> FetchResult<()> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let key = site_key(url);
        let slot = {
            let mut state = self.state.lock().await;
            let interval = state
                .intervals
                .get(&key)
                .copied()
                .unwrap_or(self.default_interval);
            let now = Instant::now();
            let slot = match state.next_slot.get(&key) {
                Some(next) if *next > now => *next,
                _ => now,
            };
            state.next_slot.insert(key.clone(), slot + interval);
            state.last_slot.insert(key.clone(), slot);
            slot
        };

        let wait = slot.saturating_duration_since(Instant::now());
        if wait.is_zero() {
            return Ok(());
        }

        debug!(domain = %key, wait_ms = wait.as_millis() as u64, "Waiting for request slot");
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }
}
