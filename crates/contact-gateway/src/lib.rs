// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! Contact Gateway - abuse-resistant intake for website form submissions.
//!
//! Accepts a form post, screens it, and guarantees the submission is either
//! delivered as a notification email or saved to a fallback store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         CONTACT GATEWAY                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────┐  ┌──────────┐         │
//! │  │ /contact   │  │ /csrf-token │  │ /health  │  │ /metrics │         │
//! │  └─────┬──────┘  └──────┬──────┘  └──────────┘  └──────────┘         │
//! │        │                │                                            │
//! │  ┌─────┴────────────────┴───────────────────────────┐                │
//! │  │                Middleware Stack                   │                │
//! │  │  Headers → CORS → Tracing → BodyLimit → ClientIP  │                │
//! │  └─────┬─────────────────────────────────────────────┘                │
//! │        │                                                             │
//! │  ┌─────┴─────────────────────────────────────────────┐               │
//! │  │               Submission Pipeline                  │               │
//! │  │  Method → Rate → Token → Honeypot → Validate →     │               │
//! │  │  Dispatch (mail | fallback) → Audit                │               │
//! │  └─────┬──────────────────┬───────────────────┬───────┘               │
//! └────────┼──────────────────┼───────────────────┼──────────────────────┘
//!          ▼                  ▼                   ▼
//!    rate_limit.log     sendmail / log     submissions.log
//!                                          fallback.log
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use contact_gateway::{ContactGatewayService, GatewayConfig};
//!
//! let config = GatewayConfig::load("gateway.toml")?;
//! let service = ContactGatewayService::new(config)?;
//! service.start().await?;
//! ```
//!
//! # Guarantees
//!
//! - A submission that passes screening is delivered or persisted, never dropped silently
//! - Every attempt leaves exactly one audit record, with no message content
//! - Rate limit state is shared across processes through a locked file

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod middleware;
pub mod pipeline;
pub mod ports;
pub mod router;
pub mod service;

// Re-exports for public API
pub use adapters::{FileAppendLog, FileRateLimitLog, SessionStore};
pub use domain::config::GatewayConfig;
pub use domain::error::{GatewayError, StoreError, SubmissionError, TransportError};
pub use domain::types::*;
pub use middleware::GatewayMetrics;
pub use pipeline::{SubmissionGateway, SubmissionResult};
pub use router::{build_router, AppState, SUCCESS_MESSAGE};
pub use service::{ContactGatewayService, GatewayComponents};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
