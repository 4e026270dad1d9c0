//! Gateway counters, exported as JSON on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::error::SubmissionError;

/// Contact Gateway metrics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Submission outcomes
    pub submissions_total: AtomicU64,
    pub submissions_delivered: AtomicU64,
    pub method_rejected: AtomicU64,
    pub payload_rejected: AtomicU64,
    pub rate_limited: AtomicU64,
    pub forgery_rejected: AtomicU64,
    pub spam_rejected: AtomicU64,
    pub validation_failed: AtomicU64,
    pub dispatch_failed: AtomicU64,
    pub persistence_failed: AtomicU64,

    // Side channels
    pub acknowledgments_failed: AtomicU64,
    pub fallback_writes: AtomicU64,
    pub audit_write_failures: AtomicU64,
    pub rate_store_errors: AtomicU64,
    pub tokens_issued: AtomicU64,
    pub sessions_refused: AtomicU64,

    // Latency tracking (simplified - in production use histograms)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished submission attempt
    pub fn record_outcome(&self, outcome: Result<(), &SubmissionError>, latency_ms: u64) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);

        let counter = match outcome {
            Ok(()) => &self.submissions_delivered,
            Err(SubmissionError::MethodNotAllowed) => &self.method_rejected,
            Err(SubmissionError::PayloadTooLarge) => &self.payload_rejected,
            Err(SubmissionError::RateLimitExceeded) => &self.rate_limited,
            Err(SubmissionError::ForgeryCheckFailed) => &self.forgery_rejected,
            Err(SubmissionError::SpamDetected) => &self.spam_rejected,
            Err(SubmissionError::ValidationFailed(_)) => &self.validation_failed,
            Err(SubmissionError::DispatchFailed) => &self.dispatch_failed,
            Err(SubmissionError::PersistenceFailed(_)) => &self.persistence_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_failure(&self) {
        self.acknowledgments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_write(&self) {
        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Audit write failures never reach the caller; this is where they show.
    pub fn record_audit_failure(&self) {
        self.audit_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_store_error(&self) {
        self.rate_store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_issued(&self) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_refused(&self) {
        self.sessions_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        serde_json::json!({
            "submissions": {
                "total": load(&self.submissions_total),
                "delivered": load(&self.submissions_delivered),
                "method_rejected": load(&self.method_rejected),
                "payload_rejected": load(&self.payload_rejected),
                "rate_limited": load(&self.rate_limited),
                "forgery_rejected": load(&self.forgery_rejected),
                "spam_rejected": load(&self.spam_rejected),
                "validation_failed": load(&self.validation_failed),
                "dispatch_failed": load(&self.dispatch_failed),
                "persistence_failed": load(&self.persistence_failed),
            },
            "delivery": {
                "acknowledgments_failed": load(&self.acknowledgments_failed),
                "fallback_writes": load(&self.fallback_writes),
            },
            "stores": {
                "audit_write_failures": load(&self.audit_write_failures),
                "rate_store_errors": load(&self.rate_store_errors),
            },
            "sessions": {
                "tokens_issued": load(&self.tokens_issued),
                "refused": load(&self.sessions_refused),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, outcome: Result<(), &SubmissionError>) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_outcome(outcome, latency_ms);
    }
}
