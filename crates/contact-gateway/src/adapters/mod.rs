//! Adapters implementing the outbound ports.

pub mod file_log;
pub mod lock;
pub mod mail;
pub mod memory;
pub mod session;

pub use file_log::{FileAppendLog, FileRateLimitLog};
pub use lock::{FileLock, LockError};
pub use mail::{LogOnlyTransport, SendmailTransport};
pub use session::{SessionHandle, SessionRefused, SessionStore};
