//! Sliding-window rate limiting over a durable admission log.
//!
//! The log is the only record of history. Entries older than the window are
//! dropped when the log is next touched; an entry exactly at the window
//! boundary is still live.

use crate::domain::error::StoreError;
use crate::domain::types::{ClientIdentity, RateLimitEntry};
use crate::ports::{RateLimitLog, TimeSource};
use std::sync::Arc;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admission recorded
    Allowed,
    /// Request rate limited
    Limited {
        /// Seconds until the oldest live admission ages out
        retry_after: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Apply one check to the current log contents.
///
/// Returns the decision and, when allowed, the full retained set (every
/// client's live entries plus the new admission) to write back.
pub fn apply_window(
    entries: Vec<RateLimitEntry>,
    client: &str,
    limit: u32,
    window_secs: u64,
    now: u64,
) -> (RateDecision, Option<Vec<RateLimitEntry>>) {
    let cutoff = now.saturating_sub(window_secs);

    let mut retained: Vec<RateLimitEntry> = entries
        .into_iter()
        .filter(|entry| entry.timestamp >= cutoff)
        .collect();

    let (count, oldest) = retained
        .iter()
        .filter(|entry| entry.client == client)
        .fold((0usize, None::<u64>), |(count, oldest), entry| {
            let oldest = Some(oldest.map_or(entry.timestamp, |ts| ts.min(entry.timestamp)));
            (count + 1, oldest)
        });

    if count >= limit as usize {
        let retry_after = oldest
            .map(|ts| (ts + window_secs + 1).saturating_sub(now))
            .unwrap_or(window_secs);
        return (RateDecision::Limited { retry_after }, None);
    }

    retained.push(RateLimitEntry::new(now, client));
    (RateDecision::Allowed, Some(retained))
}

/// Rate limiter bound to a durable log and a clock.
#[derive(Clone)]
pub struct RateLimiter {
    log: Arc<dyn RateLimitLog>,
    clock: Arc<dyn TimeSource>,
}

impl RateLimiter {
    pub fn new(log: Arc<dyn RateLimitLog>, clock: Arc<dyn TimeSource>) -> Self {
        Self { log, clock }
    }

    /// Check and, if under the limit, record an admission for `client`.
    ///
    /// Blocking: the log adapter may wait for a file lock.
    pub fn allow(
        &self,
        client: &ClientIdentity,
        limit: u32,
        window_secs: u64,
    ) -> Result<RateDecision, StoreError> {
        let now = self.clock.now();
        let mut decision = RateDecision::Limited { retry_after: 0 };

        self.log.update(&mut |entries| {
            let (result, retained) =
                apply_window(entries, client.as_str(), limit, window_secs, now);
            decision = result;
            retained
        })?;

        debug!(client = %client, ?decision, "Rate limit check");
        Ok(decision)
    }
}
