//! Honeypot trap detection.

use crate::domain::types::SubmissionRequest;

/// True when the reserved honeypot field carries any value at all.
pub fn is_spam(request: &SubmissionRequest, honeypot_field: &str) -> bool {
    request
        .field(honeypot_field)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}
