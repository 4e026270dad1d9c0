//! Notification composition and delivery with fallback persistence.
//!
//! A delivery attempt is made exactly once. When the notification is not
//! delivered the whole submission is written to the fallback store; losing
//! it there is the only fatal outcome of the pipeline.

use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use tracing::{debug, error, info, warn};

use crate::domain::config::MailConfig;
use crate::domain::error::{StoreError, SubmissionError, TransportError};
use crate::domain::types::{FallbackRecord, OptionalField, SubmissionRequest, ValidatedSubmission};
use crate::domain::validation::is_valid_email;
use crate::ports::{AppendLog, MailHeader, MailTransport, TimeSource};

/// Strip CR and LF so a value can never open a new header line.
pub fn header_value(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// `primary_interest` → `Primary Interest`
pub fn title_case(value: &str) -> String {
    value
        .replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A fully composed message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<MailHeader>,
}

fn base_headers(mail: &MailConfig, request: &SubmissionRequest) -> Vec<MailHeader> {
    vec![
        ("MIME-Version".to_string(), "1.0".to_string()),
        (
            "Content-Type".to_string(),
            "text/plain; charset=UTF-8".to_string(),
        ),
        ("Content-Transfer-Encoding".to_string(), "8bit".to_string()),
        ("From".to_string(), header_value(&mail.from_address)),
        (
            "X-Source-IP".to_string(),
            header_value(request.client().as_str()),
        ),
    ]
}

/// Internal notification for the site owner.
pub fn compose_notification(
    mail: &MailConfig,
    request: &SubmissionRequest,
    submission: &ValidatedSubmission,
) -> OutboundMail {
    let brand = &mail.brand_name;
    let form_type = submission.form_type();
    let subject = format!("New {} Inquiry — {}", title_case(form_type), brand);

    let mut body = format!("New inquiry from {} website\n", brand);
    body.push_str("==========================================\n\n");
    body.push_str(&format!("Name: {}\n", submission.name()));
    body.push_str(&format!("Email: {}\n", submission.email()));

    let details: [(OptionalField, &str, fn(&str) -> String); 7] = [
        (OptionalField::Company, "Company", str::to_string),
        (OptionalField::Role, "Role", str::to_string),
        (OptionalField::Phone, "Phone", str::to_string),
        (OptionalField::CompanySize, "Company Size", str::to_string),
        (OptionalField::PrimaryInterest, "Primary Interest", title_case),
        (OptionalField::Package, "Package Interest", title_case),
        (OptionalField::Challenge, "Challenge", str::to_string),
    ];
    for (field, label, render) in details {
        if let Some(value) = submission.optional(field) {
            body.push_str(&format!("{}: {}\n", label, render(value)));
        }
    }

    body.push_str(&format!("\nMessage:\n{}\n\n", submission.message()));
    body.push_str("---\n");
    body.push_str(&format!("Form Type: {}\n", form_type));
    body.push_str(&format!("IP Address: {}\n", request.client()));
    body.push_str(&format!(
        "User Agent: {}\n",
        request.user_agent().unwrap_or("unknown")
    ));
    body.push_str(&format!(
        "Timestamp: {}\n",
        request
            .received_at()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    body.push_str(&format!(
        "Submitted from: {}\n",
        request.referer().unwrap_or("unknown")
    ));

    let mut headers = base_headers(mail, request);
    if is_valid_email(submission.email()) {
        headers.push(("Reply-To".to_string(), header_value(submission.email())));
    }

    OutboundMail {
        to: mail.notify_address.clone(),
        subject,
        body,
        headers,
    }
}

/// Automated acknowledgment sent back to the submitter.
pub fn compose_acknowledgment(
    mail: &MailConfig,
    request: &SubmissionRequest,
    submission: &ValidatedSubmission,
) -> OutboundMail {
    let brand = &mail.brand_name;
    let body = format!(
        "Hi {name},\n\n\
         Thank you for your interest in {brand}. We've received your message and will get back to you within 24 hours.\n\n\
         Best regards,\n\
         The {brand} Team\n\n\
         ---\n\
         This is an automated response. Please do not reply to this email.",
        name = submission.name(),
        brand = brand,
    );

    OutboundMail {
        to: submission.email().to_string(),
        subject: format!("Thank you for contacting {}", brand),
        body,
        headers: base_headers(mail, request),
    }
}

/// How a dispatch ended when nothing was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification delivered
    Delivered {
        /// Whether the acknowledgment also went out
        acknowledged: bool,
    },
    /// Notification failed; the submission is in the fallback store
    FallbackSaved,
}

/// Delivers notifications and owns the fallback path.
#[derive(Clone)]
pub struct Dispatcher {
    mail: MailConfig,
    transport: Arc<dyn MailTransport>,
    fallback: Arc<dyn AppendLog>,
    clock: Arc<dyn TimeSource>,
}

impl Dispatcher {
    pub fn new(
        mail: MailConfig,
        transport: Arc<dyn MailTransport>,
        fallback: Arc<dyn AppendLog>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            mail,
            transport,
            fallback,
            clock,
        }
    }

    /// One bounded delivery attempt. A timeout counts as failure.
    async fn deliver(&self, message: &OutboundMail) -> Result<bool, TransportError> {
        let timeout: Duration = self.mail.send_timeout;
        match tokio::time::timeout(
            timeout,
            self.transport
                .deliver(&message.to, &message.subject, &message.body, &message.headers),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Send the notification, then the acknowledgment.
    ///
    /// # Errors
    ///
    /// `DispatchFailed` never escapes as an error: it is reported as
    /// `DispatchOutcome::FallbackSaved`. Only `PersistenceFailed` is returned.
    pub async fn send(
        &self,
        request: &SubmissionRequest,
        submission: &ValidatedSubmission,
    ) -> Result<DispatchOutcome, SubmissionError> {
        let notification = compose_notification(&self.mail, request, submission);

        let failure = match self.deliver(&notification).await {
            Ok(true) => None,
            Ok(false) => Some("transport reported non-delivery".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            warn!(%reason, "Notification not delivered, writing fallback record");
            self.persist_fallback(request, submission).await?;
            return Ok(DispatchOutcome::FallbackSaved);
        }

        info!(to = %notification.to, "Notification delivered");

        let ack = compose_acknowledgment(&self.mail, request, submission);
        let acknowledged = match self.deliver(&ack).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Acknowledgment not delivered");
                false
            }
            Err(e) => {
                debug!(error = %e, "Acknowledgment failed");
                false
            }
        };

        Ok(DispatchOutcome::Delivered { acknowledged })
    }

    async fn persist_fallback(
        &self,
        request: &SubmissionRequest,
        submission: &ValidatedSubmission,
    ) -> Result<(), SubmissionError> {
        let record = FallbackRecord {
            timestamp: self.clock.now_utc(),
            request_id: request.request_id(),
            client: request.client().clone(),
            submission: submission.clone(),
        };

        let fallback = self.fallback.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let line = record.to_line()?;
            fallback.append(&line)
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Fallback write failed, submission lost");
                Err(SubmissionError::PersistenceFailed(e.to_string()))
            }
            Err(e) => {
                error!(error = %e, "Fallback writer task failed");
                Err(SubmissionError::PersistenceFailed(e.to_string()))
            }
        }
    }
}
