//! Gateway error types.
//!
//! `SubmissionError` is the caller-facing taxonomy: every variant maps to one
//! HTTP status and one user message that carries no internal detail.

use crate::domain::types::FieldErrors;
use std::path::PathBuf;

/// Terminal outcome of a submission that did not end in delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    /// Entry point called with anything but POST
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Request body exceeded the configured limit
    #[error("payload too large")]
    PayloadTooLarge,

    /// Client identity exhausted its window
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Anti-forgery token missing or stale
    #[error("anti-forgery check failed")]
    ForgeryCheckFailed,

    /// Honeypot field was filled in
    #[error("spam detected")]
    SpamDetected,

    /// One or more fields failed validation
    #[error("validation failed for {} field(s)", .0.len())]
    ValidationFailed(FieldErrors),

    /// Primary delivery failed; the submission was saved to the fallback store
    #[error("dispatch failed, submission kept in fallback store")]
    DispatchFailed,

    /// Fallback store could not be written; the submission may be lost
    #[error("fallback persistence failed: {0}")]
    PersistenceFailed(String),
}

impl SubmissionError {
    /// HTTP status returned to programmatic callers
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MethodNotAllowed => 405,
            Self::PayloadTooLarge => 413,
            Self::RateLimitExceeded => 429,
            Self::ForgeryCheckFailed => 403,
            Self::SpamDetected => 400,
            Self::ValidationFailed(_) => 200,
            Self::DispatchFailed => 200,
            Self::PersistenceFailed(_) => 500,
        }
    }

    /// Message shown to the submitter
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "Method not allowed.",
            Self::PayloadTooLarge => "Your submission is too large.",
            Self::RateLimitExceeded => "Too many requests. Please try again later.",
            Self::ForgeryCheckFailed => "Invalid security token. Please refresh and try again.",
            Self::SpamDetected => "Your submission could not be accepted.",
            Self::ValidationFailed(_) => "Please correct the errors below.",
            Self::DispatchFailed => {
                "Sorry, there was an issue sending your message. Please try again or email us directly."
            }
            Self::PersistenceFailed(_) => {
                "An internal error occurred. Please email us directly."
            }
        }
    }

    /// Short reason recorded in the audit log
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method_not_allowed",
            Self::PayloadTooLarge => "payload_too_large",
            Self::RateLimitExceeded => "rate_limited",
            Self::ForgeryCheckFailed => "forgery_check_failed",
            Self::SpamDetected => "honeypot",
            Self::ValidationFailed(_) => "validation_failed",
            Self::DispatchFailed => "dispatch_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
        }
    }

    /// Only a lost submission is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PersistenceFailed(_))
    }
}

/// Durable store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Exclusive lock not acquired within the bounded wait
    #[error("lock on {0} not acquired in time")]
    LockTimeout(PathBuf),

    /// Record could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Mail transport failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Transport did not finish within the send timeout
    #[error("transport timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport process or connection failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport refused the message
    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Gateway-level errors (startup and serving, not per-request)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Durable store could not be prepared
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Server stopped with an error
    #[error("server error: {0}")]
    Serve(String),
}
