//! Domain layer of the Contact Gateway.
//!
//! Pure rules (validation, spam, the sliding window, token checks) plus the
//! two components that reach outbound ports: `RateLimiter` and `Dispatcher`.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod rate_limit;
pub mod spam;
pub mod token;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use audit::SubmissionLogger;
pub use config::{ConfigError, GatewayConfig};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{GatewayError, StoreError, SubmissionError, TransportError};
pub use rate_limit::{RateDecision, RateLimiter};
pub use token::{AntiForgeryToken, SessionRecord};
pub use types::*;
