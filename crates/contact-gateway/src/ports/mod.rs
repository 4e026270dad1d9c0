//! Ports (hexagonal boundaries) of the Contact Gateway.

pub mod outbound;

pub use outbound::{
    AppendLog, MailHeader, MailTransport, RateLimitLog, SystemTimeSource, TimeSource,
};
