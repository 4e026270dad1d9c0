//! Outbound ports for the Contact Gateway.
//!
//! The durable stores and the mail channel are reached only through these
//! traits; flat files and sendmail are the shipped adapters.

use crate::domain::error::{StoreError, TransportError};
use crate::domain::types::RateLimitEntry;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Unix seconds
    fn now(&self) -> u64;

    /// Wall-clock timestamp for records
    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.now() as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Durable rate-limit log with an atomic read-all-then-write-all operation.
///
/// `update` holds exclusive access for the whole call: the closure sees every
/// stored entry and returns `Some(entries)` to replace the log or `None` to
/// leave it untouched.
pub trait RateLimitLog: Send + Sync {
    fn update(
        &self,
        apply: &mut dyn FnMut(Vec<RateLimitEntry>) -> Option<Vec<RateLimitEntry>>,
    ) -> Result<(), StoreError>;
}

/// Durable append-only line log.
///
/// Each call writes one whole line atomically with respect to other writers.
pub trait AppendLog: Send + Sync {
    fn append(&self, line: &str) -> Result<(), StoreError>;
}

/// Outbound mail header
pub type MailHeader = (String, String);

/// External mail channel.
///
/// `Ok(false)` and `Err(_)` both mean the message was not delivered.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        headers: &[MailHeader],
    ) -> Result<bool, TransportError>;
}
