//! Middleware stack for the Contact Gateway.
//!
//! Layer order (outer → inner): security headers → CORS → tracing →
//! body limit → client identity → handler.

pub mod client_ip;
pub mod cors;
pub mod metrics;
pub mod tracing;

pub use client_ip::{is_public_ip, resolve_client, ClientIdentityLayer};
pub use cors::{create_cors_layer, security_headers};
pub use metrics::{GatewayMetrics, RequestTimer};
pub use tracing::TracingLayer;
