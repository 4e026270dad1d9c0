//! # HTTP Surface
//!
//! Token issuance, the middleware stack and the operational endpoints.

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};

    use crate::integration::support::{
        body_json, header_str, set_cookie, FormPost, TestGateway,
    };

    // =========================================================================
    // TOKEN ENDPOINT
    // =========================================================================

    #[tokio::test]
    async fn test_token_endpoint_opens_session() {
        let gw = TestGateway::new();

        let response = gw.get("/csrf-token").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, header::CACHE_CONTROL), Some("no-store"));

        let cookie = header_str(&response, header::SET_COOKIE).unwrap().to_string();
        assert!(cookie.starts_with("contact_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Path=/"));

        let token = body_json(response).await["csrf_token"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_token_is_stable_within_session() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        let again = gw
            .send(
                Request::builder()
                    .uri("/csrf-token")
                    .header(header::COOKIE, &session.cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert!(set_cookie(&again).is_none());
        assert_eq!(body_json(again).await["csrf_token"], session.token.as_str());
    }

    #[tokio::test]
    async fn test_expired_session_gets_new_cookie() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        gw.clock.advance(1441);
        let response = gw
            .send(
                Request::builder()
                    .uri("/csrf-token")
                    .header(header::COOKIE, &session.cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let cookie = set_cookie(&response).unwrap();
        assert_ne!(cookie, session.cookie);

        // The old token died with its session
        let stale = gw.submit(FormPost::for_session(&session)).await;
        assert_eq!(stale.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_insecure_cookie_when_configured() {
        let mut config = crate::integration::support::test_config();
        config.security.secure_cookies = false;
        let gw = TestGateway::build(
            config,
            contact_gateway::adapters::memory::RecordingTransport::delivering(),
            None,
        );

        let response = gw.get("/csrf-token").await;
        let cookie = header_str(&response, header::SET_COOKIE).unwrap();
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn test_token_endpoint_caps_sessions_per_client() {
        let mut config = crate::integration::support::test_config();
        config.session.max_sessions_per_client = 2;
        let gw = TestGateway::build(
            config,
            contact_gateway::adapters::memory::RecordingTransport::delivering(),
            None,
        );

        let first = gw.open_session().await;
        gw.open_session().await;

        let refused = gw.get("/csrf-token").await;
        assert_eq!(refused.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(set_cookie(&refused).is_none());
        assert!(body_json(refused).await["error"].is_string());

        // Sessions already open keep their tokens
        let again = gw
            .send(
                Request::builder()
                    .uri("/csrf-token")
                    .header(header::COOKIE, &first.cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(again.status(), StatusCode::OK);
        assert_eq!(body_json(again).await["csrf_token"], first.token.as_str());

        let metrics = body_json(gw.get("/metrics").await).await;
        assert_eq!(metrics["sessions"]["refused"], 1);
    }

    // =========================================================================
    // MIDDLEWARE
    // =========================================================================

    #[tokio::test]
    async fn test_security_headers_on_every_response() {
        let gw = TestGateway::new();

        for response in [
            gw.get("/health").await,
            gw.get("/contact").await,
            gw.submit(FormPost::new()).await,
        ] {
            assert_eq!(
                header_str(&response, header::X_CONTENT_TYPE_OPTIONS),
                Some("nosniff")
            );
            assert_eq!(header_str(&response, header::X_FRAME_OPTIONS), Some("DENY"));
            assert_eq!(
                header_str(&response, header::X_XSS_PROTECTION),
                Some("1; mode=block")
            );
            assert_eq!(
                header_str(&response, header::REFERRER_POLICY),
                Some("strict-origin-when-cross-origin")
            );
        }
    }

    #[tokio::test]
    async fn test_cors_preflight_for_allowed_origin() {
        let gw = TestGateway::new();

        let response = gw
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/contact")
                    .header(header::ORIGIN, "https://nyxionlabs.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some("https://nyxionlabs.com")
        );
        assert_eq!(
            header_str(&response, header::ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some("true")
        );
        // Preflights never reach the pipeline
        assert!(gw.audit.lines().is_empty());
    }

    #[tokio::test]
    async fn test_cors_rejects_foreign_origin() {
        let gw = TestGateway::new();

        let response = gw
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/contact")
                    .header(header::ORIGIN, "https://evil.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert!(header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_and_audited() {
        let gw = TestGateway::new();
        let body = format!("message={}", "a".repeat(70 * 1024));

        let response = gw
            .send(
                Request::builder()
                    .method(Method::POST)
                    .uri("/contact")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(header::CONTENT_LENGTH, body.len())
                    .header("x-requested-with", "XMLHttpRequest")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["success"], false);

        let records = gw.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason.as_deref(), Some("payload_too_large"));
        // Never parsed, so nothing to measure
        assert_eq!(records[0].message_length, 0);

        let metrics = body_json(gw.get("/metrics").await).await;
        assert_eq!(metrics["submissions"]["payload_rejected"], 1);
        assert!(gw.rate_log.entries().is_empty());
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    #[tokio::test]
    async fn test_health() {
        let gw = TestGateway::new();

        let response = gw.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], contact_gateway::VERSION);
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let gw = TestGateway::new();
        let session = gw.open_session().await;

        gw.submit(FormPost::for_session(&session)).await;
        gw.submit(FormPost::new()).await;
        gw.get("/contact").await;

        let body = body_json(gw.get("/metrics").await).await;
        assert_eq!(body["submissions"]["total"], 3);
        assert_eq!(body["submissions"]["delivered"], 1);
        assert_eq!(body["submissions"]["forgery_rejected"], 1);
        assert_eq!(body["submissions"]["method_rejected"], 1);
        assert_eq!(body["sessions"]["tokens_issued"], 1);
        assert_eq!(body["stores"]["audit_write_failures"], 0);
    }
}
