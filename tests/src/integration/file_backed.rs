//! # Flat-File Stores
//!
//! The shipped adapters under a temporary data directory: what lands on
//! disk, and rate limiting shared by two gateways over one directory.

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use contact_gateway::adapters::memory::RecordingTransport;
    use contact_gateway::{ContactGatewayService, GatewayComponents, GatewayConfig};

    use crate::integration::support::{body_json, set_cookie, test_config, FormPost, CLIENT_IP};

    fn config_in(dir: &Path) -> GatewayConfig {
        let mut config = test_config();
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
        router.clone().oneshot(request).await.unwrap()
    }

    /// Fetch a token and submit a valid form in one session.
    async fn submit_valid(router: &Router) -> Response<Body> {
        let response = send(
            router,
            Request::builder().uri("/csrf-token").body(Body::empty()).unwrap(),
        )
        .await;
        let cookie = set_cookie(&response).unwrap();
        let token = body_json(response).await["csrf_token"]
            .as_str()
            .unwrap()
            .to_string();

        let post = FormPost::new().cookie(&cookie).field("csrf_token", &token);
        send(router, post.into_request()).await
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_delivery_writes_audit_and_rate_logs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let storage = config.storage.clone();

        let service = ContactGatewayService::new(config).unwrap();
        let response = submit_valid(&service.router()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);

        let audit = read_lines(&storage.submissions_path());
        assert_eq!(audit.len(), 1);
        let record: serde_json::Value = serde_json::from_str(&audit[0]).unwrap();
        assert_eq!(record["outcome"], "success");
        assert_eq!(record["client"], CLIENT_IP);

        let rate = read_lines(&storage.rate_limit_path());
        assert_eq!(rate.len(), 1);
        assert!(rate[0].ends_with(&format!("|{}", CLIENT_IP)));

        assert!(!storage.fallback_path().exists());
    }

    #[tokio::test]
    async fn test_failed_delivery_appends_fallback_line() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let storage = config.storage.clone();

        let mut components = GatewayComponents::from_config(&config);
        components.transport = Arc::new(RecordingTransport::failing());
        let service = ContactGatewayService::with_components(config, components).unwrap();

        let response = submit_valid(&service.router()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], false);

        let fallback = read_lines(&storage.fallback_path());
        assert_eq!(fallback.len(), 1);
        let (stamp, json) = fallback[0].split_once(" | ").unwrap();
        assert!(chrono_like(stamp), "{}", stamp);
        let record: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(record["submission"]["name"], "Grace Hopper");
        assert_eq!(record["client"], CLIENT_IP);
    }

    #[tokio::test]
    async fn test_gateways_sharing_a_directory_share_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let first = ContactGatewayService::new(config_in(dir.path())).unwrap();
        let second = ContactGatewayService::new(config_in(dir.path())).unwrap();
        let (a, b) = (first.router(), second.router());

        for router in [&a, &b, &a, &b, &a] {
            let response = send(router, FormPost::new().into_request()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        let response = send(&b, FormPost::new().into_request()).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let rate = read_lines(&dir.path().join("rate_limit.log"));
        assert_eq!(rate.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_admit_exactly_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let service = ContactGatewayService::new(config_in(dir.path())).unwrap();
        let router = service.router();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { send(&router, FormPost::new().into_request()).await })
            })
            .collect();

        let mut limited = 0;
        for handle in handles {
            if handle.await.unwrap().status() == StatusCode::TOO_MANY_REQUESTS {
                limited += 1;
            }
        }
        assert_eq!(limited, 7);

        let audit = read_lines(&dir.path().join("submissions.log"));
        assert_eq!(audit.len(), 12);
    }

    /// `YYYY-MM-DDTHH:MM:SSZ`
    fn chrono_like(stamp: &str) -> bool {
        let bytes = stamp.as_bytes();
        stamp.len() == 20 && bytes[4] == b'-' && bytes[10] == b'T' && stamp.ends_with('Z')
    }
}
