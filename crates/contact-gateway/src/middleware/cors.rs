//! CORS and security response headers.
//!
//! Wrappers around tower-http configured from the gateway's security section.

use crate::domain::config::SecurityConfig;
use axum::http::{header, HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::CorsLayer as TowerCorsLayer;

/// Preflight cache lifetime
const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Create CORS layer restricted to the configured origins.
///
/// Credentials are allowed so the session cookie travels with cross-origin
/// form posts from the site's own pages.
pub fn create_cors_layer(config: &SecurityConfig) -> TowerCorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.trim_end_matches('/').parse().ok())
        .collect();

    TowerCorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE)
}

/// Headers set on every response.
pub fn security_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ),
        (
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
    ]
}
