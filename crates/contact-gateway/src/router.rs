//! HTTP surface of the gateway.
//!
//! | Route         | Method | Purpose                                   |
//! |---------------|--------|-------------------------------------------|
//! | `/contact`    | any    | Submission entry point (POST only)        |
//! | `/csrf-token` | GET    | Issue the session's anti-forgery token    |
//! | `/health`     | GET    | Liveness probe                            |
//! | `/metrics`    | GET    | JSON snapshot of gateway counters         |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Extension, Json, Router,
};
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, error, warn};

use crate::adapters::session::SessionRefused;
use crate::domain::config::GatewayConfig;
use crate::domain::error::SubmissionError;
use crate::domain::types::{ClientIdentity, ResponseMode, SubmissionRequest};
use crate::middleware::{
    create_cors_layer, security_headers, ClientIdentityLayer, GatewayMetrics, TracingLayer,
};
use crate::pipeline::{SubmissionGateway, SubmissionResult};

/// Message returned on delivery
pub const SUCCESS_MESSAGE: &str = "Thank you! Your message has been sent successfully.";

/// Body of a refused `/csrf-token` request
const SESSION_REFUSED_MESSAGE: &str = "Too many requests. Please try again later.";

/// Caller-supplied redirect overrides
const REDIRECT_SUCCESS_FIELD: &str = "redirect_success";
const REDIRECT_ERROR_FIELD: &str = "redirect_error";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SubmissionGateway>,
    pub config: Arc<GatewayConfig>,
    pub metrics: Arc<GatewayMetrics>,
}

/// Build the router with the full middleware stack.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let mut router = Router::new()
        .route("/contact", any(handle_contact))
        .route("/csrf-token", get(issue_token))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_snapshot))
        .with_state(state)
        .layer(ClientIdentityLayer::new(config.security.clone()))
        .layer(DefaultBodyLimit::max(config.http.max_body_bytes))
        .layer(TracingLayer::new())
        .layer(create_cors_layer(&config.security));

    for (name, value) in security_headers() {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }
    router
}

/// JSON body for programmatic callers
#[derive(Debug, Serialize)]
struct SubmissionResponse<'a> {
    success: bool,
    message: &'a str,
    errors: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    csrf_token: Option<&'a str>,
}

async fn handle_contact(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let mut oversized = false;
    let fields: Vec<(String, String)> = match body {
        Ok(body) if method == Method::POST => serde_urlencoded::from_bytes(&body)
            .unwrap_or_else(|e| {
                debug!(error = %e, "Unparseable form body");
                Vec::new()
            }),
        Ok(_) => Vec::new(),
        Err(rejection) => {
            oversized = rejection.status() == StatusCode::PAYLOAD_TOO_LARGE;
            debug!(error = %rejection, "Request body not read");
            Vec::new()
        }
    };

    let mut request = SubmissionRequest::new(method.as_str(), fields, client)
        .with_mode(response_mode(&headers))
        .with_user_agent(header_string(&headers, header::USER_AGENT))
        .with_referer(header_string(&headers, header::REFERER));
    if oversized {
        request = request.with_oversized_body();
    }

    let session = cookie_value(&headers, &state.config.session.cookie_name);
    let result = state.gateway.handle(&request, session.as_deref()).await;

    match request.mode() {
        ResponseMode::Interactive => json_response(&result),
        ResponseMode::Redirect => redirect_response(&state.config, &request, &result),
    }
}

fn response_mode(headers: &HeaderMap) -> ResponseMode {
    let interactive = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
        .unwrap_or(false);

    if interactive {
        ResponseMode::Interactive
    } else {
        ResponseMode::Redirect
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Value of the named cookie, if the request carries it.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}

fn status_of(result: &SubmissionResult) -> StatusCode {
    let code = match &result.outcome {
        Ok(()) => 200,
        Err(e) => e.status_code(),
    };
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_response(result: &SubmissionResult) -> Response {
    let (message, errors) = match &result.outcome {
        Ok(()) => (SUCCESS_MESSAGE, BTreeMap::new()),
        Err(e) => {
            let errors = match e {
                SubmissionError::ValidationFailed(errors) => errors.messages(),
                _ => BTreeMap::new(),
            };
            (e.user_message(), errors)
        }
    };

    let body = SubmissionResponse {
        success: result.outcome.is_ok(),
        message,
        errors,
        csrf_token: result.rotated_token.as_ref().map(|t| t.as_str()),
    };

    let mut response = (status_of(result), Json(body)).into_response();
    finish_headers(&mut response, result);
    response
}

fn redirect_response(
    config: &GatewayConfig,
    request: &SubmissionRequest,
    result: &SubmissionResult,
) -> Response {
    match &result.outcome {
        Err(e @ SubmissionError::MethodNotAllowed) => {
            let mut response = (status_of(result), e.user_message()).into_response();
            finish_headers(&mut response, result);
            return response;
        }
        Err(e) if e.is_fatal() => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.user_message()).into_response();
        }
        _ => {}
    }

    let (field, default) = match result.outcome {
        Ok(()) => (REDIRECT_SUCCESS_FIELD, &config.redirects.success),
        Err(_) => (REDIRECT_ERROR_FIELD, &config.redirects.failure),
    };

    let target = match request.field(field) {
        Some(candidate) if is_safe_redirect(candidate, &config.security.allowed_origins) => {
            candidate
        }
        Some(candidate) => {
            warn!(target = candidate, "Ignoring unsafe redirect override");
            default.as_str()
        }
        None => default.as_str(),
    };

    match HeaderValue::from_str(target) {
        Ok(location) => {
            let mut response = StatusCode::SEE_OTHER.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Err(e) => {
            error!(target, error = %e, "Redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn finish_headers(response: &mut Response, result: &SubmissionResult) {
    if matches!(result.outcome, Err(SubmissionError::MethodNotAllowed)) {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("POST"));
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

/// Overrides may only point back at this site: a rooted relative path, or
/// an absolute URL on one of the allowed origins.
pub fn is_safe_redirect(target: &str, allowed_origins: &[String]) -> bool {
    if target.is_empty()
        || !target.is_ascii()
        || target.chars().any(|c| c.is_ascii_control() || c == '\\' || c == ' ')
    {
        return false;
    }

    if target.starts_with('/') {
        return !target.starts_with("//");
    }

    let Some((scheme, rest)) = target.split_once("://") else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return false;
    }

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    if authority.is_empty() || authority.contains('@') {
        return false;
    }

    let origin = format!("{}://{}", scheme, authority).to_ascii_lowercase();
    allowed_origins
        .iter()
        .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(&origin))
}

#[derive(Debug, Serialize)]
struct TokenResponse<'a> {
    csrf_token: &'a str,
}

async fn issue_token(
    State(state): State<AppState>,
    Extension(client): Extension<ClientIdentity>,
    headers: HeaderMap,
) -> Response {
    let session_config = &state.config.session;
    let current = cookie_value(&headers, &session_config.cookie_name);
    let issued = match state.gateway.sessions().issue(current.as_deref(), &client) {
        Ok(issued) => issued,
        Err(refused) => return session_refused(&state, &client, refused),
    };
    state.metrics.record_token_issued();

    let mut response = Json(TokenResponse {
        csrf_token: issued.token.as_str(),
    })
    .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    if issued.created {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict{}",
            session_config.cookie_name,
            issued.handle.as_str(),
            if state.config.security.secure_cookies {
                "; Secure"
            } else {
                ""
            }
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => error!(error = %e, "Session cookie is not a valid header value"),
        }
    }

    response
}

fn session_refused(state: &AppState, client: &ClientIdentity, refused: SessionRefused) -> Response {
    state.metrics.record_session_refused();
    warn!(client = %client, reason = %refused, "Session not opened");

    let status = match refused {
        SessionRefused::ClientLimit => StatusCode::TOO_MANY_REQUESTS,
        SessionRefused::StoreFull => StatusCode::SERVICE_UNAVAILABLE,
    };
    let mut response = (
        status,
        Json(serde_json::json!({ "error": SESSION_REFUSED_MESSAGE })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}
