//! # Submission Flows
//!
//! Every pipeline outcome as a caller sees it over HTTP, plus what each one
//! leaves behind in the audit log, the fallback store and the outbox.
//!
//! ## Stage order under test
//!
//! ```text
//! method → rate → token (→ rotate) → honeypot → validate → dispatch → audit
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{header, Method, StatusCode};

    use contact_gateway::adapters::memory::{
        FailingAppendLog, RecordingTransport, TransportBehavior,
    };
    use contact_gateway::{Outcome, SubmissionError, SUCCESS_MESSAGE};

    use crate::integration::support::{
        body_bytes, body_json, header_str, test_config, FormPost, TestGateway, CLIENT_IP,
        USER_AGENT,
    };

    // =========================================================================
    // DELIVERY
    // =========================================================================

    #[tokio::test]
    async fn test_valid_submission_is_delivered_and_audited_once() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CACHE_CONTROL), Some("no-store"));

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], SUCCESS_MESSAGE);
        assert!(body["errors"].as_object().unwrap().is_empty());
        let rotated = body["csrf_token"].as_str().unwrap();
        assert_ne!(rotated, session.token);

        // Notification, then acknowledgment
        let sent = gw.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "info@nyxionlabs.com");
        assert!(sent[0].subject.starts_with("New Consultation Inquiry"));
        assert_eq!(sent[0].header("Reply-To"), Some("grace@example.com"));
        assert_eq!(sent[0].header("X-Source-IP"), Some(CLIENT_IP));
        assert!(sent[0].body.contains("Company: Eckert-Mauchly"));
        assert_eq!(sent[1].to, "grace@example.com");
        assert_eq!(sent[1].subject, "Thank you for contacting Nyxion Labs");

        let records = gw.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Success);
        assert_eq!(records[0].client.as_str(), CLIENT_IP);
        assert_eq!(records[0].user_agent, USER_AGENT);
        assert_eq!(records[0].form_type, "consultation");
        assert!(records[0].reason.is_none());

        assert!(gw.fallback.lines().is_empty());
    }

    #[tokio::test]
    async fn test_audit_log_never_holds_message_content() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        gw.submit(FormPost::for_session(&session)).await;

        let raw = gw.audit.lines().join("\n");
        assert!(!raw.contains("compiler project"));
        assert!(!raw.contains("grace@example.com"));
        assert!(!raw.contains("Grace Hopper"));
    }

    #[tokio::test]
    async fn test_acknowledgment_failure_still_succeeds() {
        let transport = RecordingTransport::delivering()
            .with_script([TransportBehavior::Deliver, TransportBehavior::Error]);
        let gw = TestGateway::with_transport(transport);
        let session = gw.open_session().await;

        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);

        let metrics = gw.service.metrics().to_json();
        assert_eq!(metrics["delivery"]["acknowledgments_failed"], 1);
        assert!(gw.fallback.lines().is_empty());
    }

    // =========================================================================
    // FALLBACK
    // =========================================================================

    #[tokio::test]
    async fn test_failed_delivery_lands_in_fallback_store() {
        let gw = TestGateway::with_transport(RecordingTransport::failing());
        let session = gw.open_session().await;

        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], SubmissionError::DispatchFailed.user_message());
        assert!(body["csrf_token"].is_string());

        // No acknowledgment after a failed notification
        assert_eq!(gw.transport.sent().len(), 1);

        let fallback = gw.fallback.lines();
        assert_eq!(fallback.len(), 1);
        let (stamp, record) = fallback[0].split_once(" | ").unwrap();
        assert!(stamp.starts_with("2024-05-01T12:00:00"));
        let record: serde_json::Value = serde_json::from_str(record).unwrap();
        assert_eq!(record["submission"]["email"], "grace@example.com");
        assert_eq!(
            record["submission"]["message"],
            "We would like to talk about a compiler project."
        );

        let records = gw.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason.as_deref(), Some("dispatch_failed"));
    }

    #[tokio::test]
    async fn test_transport_timeout_counts_as_failure() {
        let mut config = test_config();
        config.mail.send_timeout = std::time::Duration::from_millis(50);
        let gw = TestGateway::build(config, RecordingTransport::new(TransportBehavior::Hang), None);
        let session = gw.open_session().await;

        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], false);
        assert_eq!(gw.fallback.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_submission_is_fatal() {
        let gw = TestGateway::build(
            test_config(),
            RecordingTransport::failing(),
            Some(Arc::new(FailingAppendLog)),
        );
        let session = gw.open_session().await;

        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            SubmissionError::PersistenceFailed(String::new()).user_message()
        );

        let records = gw.audit_records();
        assert_eq!(records[0].reason.as_deref(), Some("persistence_failed"));
    }

    // =========================================================================
    // SCREENING
    // =========================================================================

    #[tokio::test]
    async fn test_wrong_method_rejected_before_rate_check() {
        let gw = TestGateway::new();

        let response = gw.submit(FormPost::new().method(Method::PUT)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(header_str(&response, header::ALLOW), Some("POST"));
        assert_eq!(body_json(response).await["success"], false);

        assert!(gw.rate_log.entries().is_empty());
        let records = gw.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason.as_deref(), Some("method_not_allowed"));
    }

    #[tokio::test]
    async fn test_missing_token_is_forbidden() {
        let gw = TestGateway::new();

        let response = gw.submit(FormPost::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body.get("csrf_token").is_none());
        assert!(gw.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_token_from_another_session_is_forbidden() {
        let gw = TestGateway::new();
        let mine = gw.open_session().await;
        let theirs = gw.open_session().await;

        let post = FormPost::new()
            .cookie(&mine.cookie)
            .field("csrf_token", &theirs.token);
        let response = gw.submit(post).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_token_is_rotated_and_old_one_replays_fail() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let first = gw.submit(FormPost::for_session(&session)).await;
        let rotated = body_json(first).await["csrf_token"]
            .as_str()
            .unwrap()
            .to_string();

        let replay = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(replay.status(), StatusCode::FORBIDDEN);

        let fresh = FormPost::new()
            .cookie(&session.cookie)
            .field("csrf_token", &rotated);
        let response = gw.submit(fresh).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
    }

    #[tokio::test]
    async fn test_legacy_token_field_accepted() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let post = FormPost::new()
            .cookie(&session.cookie)
            .field("csrf", &session.token);
        let response = gw.submit(post).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_filled_honeypot_rejected_without_delivery() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        // Honeypot wins even when other fields are invalid
        let post = FormPost::for_session(&session)
            .field("hp", "http://cheap-pills.example")
            .field("email", "nope");
        let response = gw.submit(post).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["errors"].as_object().unwrap().is_empty());

        assert!(gw.transport.sent().is_empty());
        assert!(gw.fallback.lines().is_empty());
        assert_eq!(gw.audit_records()[0].reason.as_deref(), Some("honeypot"));
    }

    #[tokio::test]
    async fn test_field_errors_reported_together() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let post = FormPost::for_session(&session)
            .field("email", "not-an-address")
            .field("message", "too short")
            .without("name");
        let response = gw.submit(post).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        let errors = body["errors"].as_object().unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["email"], "Please enter a valid email address.");
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("message"));
        assert!(body["csrf_token"].is_string());

        assert!(gw.transport.sent().is_empty());
        let record = &gw.audit_records()[0];
        assert_eq!(record.reason.as_deref(), Some("validation_failed"));
        assert_eq!(record.field_errors.len(), 3);
    }

    #[tokio::test]
    async fn test_markup_is_stripped_before_delivery() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let post = FormPost::for_session(&session)
            .field("name", "<b>Grace</b> Hopper")
            .field("message", "<script>alert(1)</script>Please call me back soon.");
        let response = gw.submit(post).await;
        assert_eq!(body_json(response).await["success"], true);

        let notification = &gw.transport.sent()[0];
        assert!(notification.body.contains("Name: Grace Hopper"));
        assert!(!notification.body.contains("<script>"));
    }

    // =========================================================================
    // RATE LIMITING
    // =========================================================================

    #[tokio::test]
    async fn test_sixth_attempt_in_window_is_limited() {
        let gw = TestGateway::new();

        // Admissions are counted before the token check
        for _ in 0..5 {
            let response = gw.submit(FormPost::new()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        let response = gw.submit(FormPost::new()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["success"], false);

        // Other clients are unaffected
        let other = gw.submit(FormPost::new().from_ip("198.51.100.23")).await;
        assert_eq!(other.status(), StatusCode::FORBIDDEN);

        let entries = gw.rate_log.entries();
        assert_eq!(entries.iter().filter(|e| e.client == CLIENT_IP).count(), 5);

        let metrics = gw.service.metrics().to_json();
        assert_eq!(metrics["submissions"]["rate_limited"], 1);
        assert_eq!(gw.audit_records().len(), 7);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let gw = TestGateway::new();

        for _ in 0..5 {
            gw.submit(FormPost::new()).await;
        }
        let limited = gw.submit(FormPost::new()).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        gw.clock.advance(3601);
        let session = gw.open_session().await;
        let response = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_private_forwarded_address_falls_back_to_peer() {
        let gw = TestGateway::new();

        // Spoofed private addresses are not trusted; without a peer address
        // every such request shares the unknown identity.
        for _ in 0..5 {
            gw.submit(FormPost::new().from_ip("10.0.0.1")).await;
        }
        let response = gw.submit(FormPost::new().from_ip("192.168.1.9")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(gw.rate_log.entries().iter().all(|e| e.client == "unknown"));
    }

    // =========================================================================
    // REDIRECT MODE
    // =========================================================================

    #[tokio::test]
    async fn test_plain_post_redirects_to_configured_pages() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let ok = gw
            .submit(FormPost::for_session(&session).redirect_mode())
            .await;
        assert_eq!(ok.status(), StatusCode::SEE_OTHER);
        assert_eq!(header_str(&ok, header::LOCATION), Some("thank-you.html"));

        let failed = gw.submit(FormPost::new().redirect_mode()).await;
        assert_eq!(failed.status(), StatusCode::SEE_OTHER);
        assert_eq!(header_str(&failed, header::LOCATION), Some("error.html"));
    }

    #[tokio::test]
    async fn test_redirect_overrides_must_stay_on_site() {
        let gw = TestGateway::new();

        let session = gw.open_session().await;
        let local = gw
            .submit(
                FormPost::for_session(&session)
                    .field("redirect_success", "/contact/thanks")
                    .redirect_mode(),
            )
            .await;
        assert_eq!(header_str(&local, header::LOCATION), Some("/contact/thanks"));

        let session = gw.open_session().await;
        let offsite = gw
            .submit(
                FormPost::for_session(&session)
                    .field("redirect_success", "https://evil.example/phish")
                    .redirect_mode(),
            )
            .await;
        assert_eq!(header_str(&offsite, header::LOCATION), Some("thank-you.html"));

        let allowed = gw
            .submit(
                FormPost::new()
                    .field("redirect_error", "https://www.nyxionlabs.com/oops")
                    .redirect_mode(),
            )
            .await;
        assert_eq!(
            header_str(&allowed, header::LOCATION),
            Some("https://www.nyxionlabs.com/oops")
        );
    }

    #[tokio::test]
    async fn test_wrong_method_in_redirect_mode_is_405() {
        let gw = TestGateway::new();

        let response = gw.get("/contact").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(header_str(&response, header::ALLOW), Some("POST"));
        assert!(header_str(&response, header::LOCATION).is_none());
        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert_eq!(text, SubmissionError::MethodNotAllowed.user_message());
    }
}
