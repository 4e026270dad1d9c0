//! Submission pipeline.
//!
//! ```text
//! RECEIVED → RATE_CHECK → TOKEN_CHECK → SPAM_CHECK → VALIDATE → DISPATCH → RESPOND
//! ```
//!
//! Stages run strictly in order and every failure is terminal. Each exit is
//! written to the audit log before the result is returned. Once the token
//! check has passed the session's token is rotated, whatever happens next.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::adapters::session::SessionStore;
use crate::domain::audit::{build_record, SubmissionLogger};
use crate::domain::config::GatewayConfig;
use crate::domain::dispatch::{DispatchOutcome, Dispatcher};
use crate::domain::error::SubmissionError;
use crate::domain::rate_limit::{RateDecision, RateLimiter};
use crate::domain::spam::is_spam;
use crate::domain::token::AntiForgeryToken;
use crate::domain::types::{SubmissionRequest, ValidatedSubmission};
use crate::domain::validation::validate;
use crate::middleware::{GatewayMetrics, RequestTimer};
use crate::ports::TimeSource;

/// Result of one pass through the pipeline.
#[derive(Debug)]
pub struct SubmissionResult {
    /// `Ok` only when the notification was delivered
    pub outcome: Result<(), SubmissionError>,
    /// Fresh token when the session's token was rotated
    pub rotated_token: Option<AntiForgeryToken>,
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Composes the gateway components into the request pipeline.
///
/// Stateless across requests beyond the session store, the rate limiter and
/// the durable logs.
pub struct SubmissionGateway {
    config: Arc<GatewayConfig>,
    rate_limiter: RateLimiter,
    sessions: Arc<SessionStore>,
    dispatcher: Dispatcher,
    audit: SubmissionLogger,
    metrics: Arc<GatewayMetrics>,
    clock: Arc<dyn TimeSource>,
}

impl SubmissionGateway {
    pub fn new(
        config: Arc<GatewayConfig>,
        rate_limiter: RateLimiter,
        sessions: Arc<SessionStore>,
        dispatcher: Dispatcher,
        audit: SubmissionLogger,
        metrics: Arc<GatewayMetrics>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            sessions,
            dispatcher,
            audit,
            metrics,
            clock,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Run one submission through the pipeline.
    ///
    /// `session` is the caller's session handle, if any.
    pub async fn handle(&self, request: &SubmissionRequest, session: Option<&str>) -> SubmissionResult {
        let span = info_span!(
            "submission",
            request_id = %request.request_id(),
            client = %request.client(),
        );

        async move {
            let timer = RequestTimer::new(Arc::clone(&self.metrics));
            let mut rotated_token = None;
            let mut validated = None;

            let outcome = self
                .run(request, session, &mut rotated_token, &mut validated)
                .await;

            match &outcome {
                Ok(()) => info!("Submission delivered"),
                Err(e) if e.is_fatal() => warn!(reason = e.reason(), error = %e, "Submission lost"),
                Err(e) => info!(reason = e.reason(), "Submission rejected"),
            }

            let record = build_record(
                request,
                validated.as_ref(),
                outcome.as_ref().map(|_| ()),
                &self.config.form,
                self.clock.as_ref(),
            );
            if !self.audit.record(record).await {
                self.metrics.record_audit_failure();
            }

            timer.finish(outcome.as_ref().map(|_| ()));
            SubmissionResult {
                outcome,
                rotated_token,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &SubmissionRequest,
        session: Option<&str>,
        rotated_token: &mut Option<AntiForgeryToken>,
        validated: &mut Option<ValidatedSubmission>,
    ) -> Result<(), SubmissionError> {
        // RECEIVED
        if !request.is_post() {
            debug!(stage = "received", method = request.method(), "Wrong method");
            return Err(SubmissionError::MethodNotAllowed);
        }
        if request.has_oversized_body() {
            debug!(stage = "received", "Body over limit");
            return Err(SubmissionError::PayloadTooLarge);
        }

        // RATE_CHECK
        self.check_rate(request).await?;

        // TOKEN_CHECK
        if !self.sessions.verify(session, request.csrf_token()) {
            debug!(stage = "token_check", "Anti-forgery token rejected");
            return Err(SubmissionError::ForgeryCheckFailed);
        }
        *rotated_token = self.sessions.rotate(session);

        // SPAM_CHECK
        if is_spam(request, &self.config.form.honeypot_field) {
            debug!(stage = "spam_check", "Honeypot filled");
            return Err(SubmissionError::SpamDetected);
        }

        // VALIDATE
        let submission = validate(request, &self.config.form).map_err(|errors| {
            debug!(stage = "validate", fields = errors.len(), "Field validation failed");
            SubmissionError::ValidationFailed(errors)
        })?;
        let submission = validated.insert(submission);

        // DISPATCH
        match self.dispatcher.send(request, submission).await? {
            DispatchOutcome::Delivered { acknowledged } => {
                if !acknowledged {
                    self.metrics.record_ack_failure();
                }
                Ok(())
            }
            DispatchOutcome::FallbackSaved => {
                self.metrics.record_fallback_write();
                Err(SubmissionError::DispatchFailed)
            }
        }
    }

    /// Blocking log access runs off the async workers. An unavailable store
    /// fails closed.
    async fn check_rate(&self, request: &SubmissionRequest) -> Result<(), SubmissionError> {
        let limiter = self.rate_limiter.clone();
        let client = request.client().clone();
        let limit = self.config.rate_limit.limit;
        let window = self.config.rate_limit.window_secs;

        let decision =
            tokio::task::spawn_blocking(move || limiter.allow(&client, limit, window)).await;

        match decision {
            Ok(Ok(RateDecision::Allowed)) => Ok(()),
            Ok(Ok(RateDecision::Limited { retry_after })) => {
                debug!(stage = "rate_check", retry_after, "Rate limit exceeded");
                Err(SubmissionError::RateLimitExceeded)
            }
            Ok(Err(e)) => {
                self.metrics.record_rate_store_error();
                warn!(stage = "rate_check", error = %e, "Rate limit store unavailable, rejecting");
                Err(SubmissionError::RateLimitExceeded)
            }
            Err(e) => {
                self.metrics.record_rate_store_error();
                warn!(stage = "rate_check", error = %e, "Rate limit task failed, rejecting");
                Err(SubmissionError::RateLimitExceeded)
            }
        }
    }
}
