//! Submission audit trail.
//!
//! One JSON line per attempt, whatever its outcome. Records carry lengths
//! and field names, never the submitted content.

use std::sync::Arc;

use tracing::error;

use crate::domain::error::{StoreError, SubmissionError};
use crate::domain::types::{
    Outcome, SubmissionLogRecord, SubmissionRequest, ValidatedSubmission,
};
use crate::domain::config::FormConfig;
use crate::domain::validation::form_type_of;
use crate::ports::{AppendLog, TimeSource};

/// Build the audit record for one finished attempt.
pub fn build_record(
    request: &SubmissionRequest,
    submission: Option<&ValidatedSubmission>,
    outcome: Result<(), &SubmissionError>,
    form: &FormConfig,
    clock: &dyn TimeSource,
) -> SubmissionLogRecord {
    let (form_type, message_length) = match submission {
        Some(s) => (s.form_type().to_string(), s.message().chars().count()),
        None => {
            let form_type = form_type_of(request, form);
            let length = request
                .field("message")
                .map(|v| v.chars().count())
                .unwrap_or(0);
            (form_type, length)
        }
    };

    let (outcome, reason, field_errors) = match outcome {
        Ok(()) => (Outcome::Success, None, Vec::new()),
        Err(e) => {
            let fields = match e {
                SubmissionError::ValidationFailed(errors) => {
                    errors.fields().map(|f| f.as_str().to_string()).collect()
                }
                _ => Vec::new(),
            };
            (Outcome::Failure, Some(e.reason().to_string()), fields)
        }
    };

    SubmissionLogRecord {
        timestamp: clock.now_utc(),
        request_id: request.request_id(),
        client: request.client().clone(),
        user_agent: request.user_agent().unwrap_or("unknown").to_string(),
        form_type,
        message_length,
        outcome,
        reason,
        field_errors,
    }
}

/// Appends audit records to the submission log.
#[derive(Clone)]
pub struct SubmissionLogger {
    log: Arc<dyn AppendLog>,
}

impl SubmissionLogger {
    pub fn new(log: Arc<dyn AppendLog>) -> Self {
        Self { log }
    }

    /// Append one record. Failures are reported, never raised: the caller
    /// only learns whether the write happened.
    pub async fn record(&self, record: SubmissionLogRecord) -> bool {
        let log = self.log.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let line = serde_json::to_string(&record)?;
            log.append(&line)
        })
        .await;

        match written {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Audit log write failed");
                false
            }
            Err(e) => {
                error!(error = %e, "Audit writer task failed");
                false
            }
        }
    }
}
