//! In-memory adapters for tests and embedding.
//!
//! Each one mirrors the contract of its file-backed or process-backed
//! counterpart; a single mutex stands in for the file lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::error::{StoreError, TransportError};
use crate::domain::types::RateLimitEntry;
use crate::ports::{AppendLog, MailHeader, MailTransport, RateLimitLog, TimeSource};

// =============================================================================
// STORES
// =============================================================================

/// Rate-limit log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitLog {
    entries: Mutex<Vec<RateLimitEntry>>,
}

impl InMemoryRateLimitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored entries
    pub fn entries(&self) -> Vec<RateLimitEntry> {
        self.entries.lock().clone()
    }
}

impl RateLimitLog for InMemoryRateLimitLog {
    fn update(
        &self,
        apply: &mut dyn FnMut(Vec<RateLimitEntry>) -> Option<Vec<RateLimitEntry>>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if let Some(retained) = apply(entries.clone()) {
            *entries = retained;
        }
        Ok(())
    }
}

/// Append log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryAppendLog {
    lines: Mutex<Vec<String>>,
}

impl InMemoryAppendLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the appended lines
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl AppendLog for InMemoryAppendLog {
    fn append(&self, line: &str) -> Result<(), StoreError> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Append log whose every write fails, for exercising loss paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingAppendLog;

impl AppendLog for FailingAppendLog {
    fn append(&self, _line: &str) -> Result<(), StoreError> {
        Err(StoreError::io(
            "unavailable",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "store is read-only"),
        ))
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Settable clock for sliding-window tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

/// What a `RecordingTransport` does with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportBehavior {
    /// Accept the message
    Deliver,
    /// Report non-delivery (`Ok(false)`)
    Refuse,
    /// Fail with an I/O error
    Error,
    /// Never complete
    Hang,
}

/// One message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<MailHeader>,
}

impl SentMail {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that records every attempt.
///
/// Scripted behaviors are consumed first, one per call; the default
/// behavior applies once the script runs out.
#[derive(Debug)]
pub struct RecordingTransport {
    default: TransportBehavior,
    script: Mutex<VecDeque<TransportBehavior>>,
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingTransport {
    pub fn new(default: TransportBehavior) -> Self {
        Self {
            default,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn delivering() -> Self {
        Self::new(TransportBehavior::Deliver)
    }

    pub fn failing() -> Self {
        Self::new(TransportBehavior::Refuse)
    }

    /// Queue behaviors for the next calls, in order.
    pub fn with_script(self, behaviors: impl IntoIterator<Item = TransportBehavior>) -> Self {
        self.script.lock().extend(behaviors);
        self
    }

    /// Every attempted message, delivered or not
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        headers: &[MailHeader],
    ) -> Result<bool, TransportError> {
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            headers: headers.to_vec(),
        });

        let behavior = self.script.lock().pop_front().unwrap_or(self.default);
        match behavior {
            TransportBehavior::Deliver => Ok(true),
            TransportBehavior::Refuse => Ok(false),
            TransportBehavior::Error => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "recording transport configured to fail",
            ))),
            TransportBehavior::Hang => {
                // Long enough for any send timeout in tests to fire first
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(true)
            }
        }
    }
}
