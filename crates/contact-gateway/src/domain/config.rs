//! Gateway configuration with validation.
//!
//! Every section is `#[serde(default)]` so a TOML file only has to name the
//! values it overrides.

use crate::domain::validation::is_valid_email;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Sliding-window rate limiting
    pub rate_limit: RateLimitConfig,
    /// Form field rules
    pub form: FormConfig,
    /// Notification delivery
    pub mail: MailConfig,
    /// Durable log locations
    pub storage: StorageConfig,
    /// Client identity and origin policy
    pub security: SecurityConfig,
    /// Anti-forgery session handling
    pub session: SessionConfig,
    /// Form-post redirect targets
    pub redirects: RedirectConfig,
    /// Log output
    pub log: LogConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.limit == 0 {
            return Err(ConfigError::InvalidRateLimit("limit cannot be 0".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "window_secs cannot be 0".into(),
            ));
        }

        if self.form.max_message_length < MIN_MESSAGE_CHARS {
            return Err(ConfigError::InvalidLimit(format!(
                "max_message_length must be at least {}",
                MIN_MESSAGE_CHARS
            )));
        }
        if self.form.optional_field_max == 0 {
            return Err(ConfigError::InvalidLimit(
                "optional_field_max cannot be 0".into(),
            ));
        }
        if self.form.honeypot_field.trim().is_empty() {
            return Err(ConfigError::Invalid("honeypot_field cannot be empty".into()));
        }

        if self.session.max_sessions == 0 || self.session.max_sessions_per_client == 0 {
            return Err(ConfigError::InvalidLimit(
                "session limits cannot be 0".into(),
            ));
        }

        if self.http.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit("max_body_bytes cannot be 0".into()));
        }

        if !is_valid_email(&self.mail.notify_address) {
            return Err(ConfigError::InvalidAddress(self.mail.notify_address.clone()));
        }
        if !is_valid_email(&self.mail.from_address) {
            return Err(ConfigError::InvalidAddress(self.mail.from_address.clone()));
        }
        if self.mail.send_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "send_timeout cannot be 0".into(),
            ));
        }
        if self.rate_limit.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "lock_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }
}

/// Shortest message the validator accepts; a configured maximum below it
/// would reject every submission.
pub const MIN_MESSAGE_CHARS: usize = 10;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8080)
    pub port: u16,
    /// Max request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Sliding-window rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Admissions per client identity per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Bounded wait for the rate-limit log lock
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window_secs: 3600,
            lock_timeout: Duration::from_secs(2),
        }
    }
}

/// Form field configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Reserved field that humans never see and must arrive empty
    pub honeypot_field: String,
    /// Max message length in characters after cleaning
    pub max_message_length: usize,
    /// Truncation cap for optional fields
    pub optional_field_max: usize,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            honeypot_field: "hp".to_string(),
            max_message_length: 2000,
            optional_field_max: 500,
        }
    }
}

/// Which mail transport the runtime wires in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Pipe messages to a local sendmail binary
    Sendmail,
    /// Log messages and report success (development)
    Log,
}

/// Mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Brand used in subjects and acknowledgment text
    pub brand_name: String,
    /// Where notifications go
    pub notify_address: String,
    /// Sender address on every outbound message
    pub from_address: String,
    /// Upper bound on one transport call
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,
    /// Transport selection
    pub transport: TransportKind,
    /// Path to the sendmail binary
    pub sendmail_path: PathBuf,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            brand_name: "Nyxion Labs".to_string(),
            notify_address: "info@nyxionlabs.com".to_string(),
            from_address: "no-reply@nyxionlabs.com".to_string(),
            send_timeout: Duration::from_secs(10),
            transport: TransportKind::Sendmail,
            sendmail_path: PathBuf::from("/usr/sbin/sendmail"),
        }
    }
}

/// Durable store locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding all logs
    pub data_dir: PathBuf,
    /// Rate-limit log file name
    pub rate_limit_file: String,
    /// Audit log file name
    pub submissions_file: String,
    /// Fallback store file name
    pub fallback_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rate_limit_file: "rate_limit.log".to_string(),
            submissions_file: "submissions.log".to_string(),
            fallback_file: "inquiries_fallback.log".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn rate_limit_path(&self) -> PathBuf {
        self.data_dir.join(&self.rate_limit_file)
    }

    pub fn submissions_path(&self) -> PathBuf {
        self.data_dir.join(&self.submissions_file)
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.data_dir.join(&self.fallback_file)
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Proxy headers consulted, in order, for the client address
    pub client_ip_headers: Vec<String>,
    /// Proxies allowed to set those headers (empty = any peer)
    pub trusted_proxies: Vec<IpAddr>,
    /// Origins allowed for CORS and absolute redirect overrides
    pub allowed_origins: Vec<String>,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            client_ip_headers: vec![
                "CF-Connecting-IP".to_string(),
                "X-Forwarded-For".to_string(),
                "X-Real-IP".to_string(),
            ],
            trusted_proxies: Vec::new(),
            allowed_origins: vec![
                "https://nyxionlabs.com".to_string(),
                "https://www.nyxionlabs.com".to_string(),
            ],
            secure_cookies: true,
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session (and its token) ends
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Cookie carrying the session handle
    pub cookie_name: String,
    /// Live sessions held across all clients
    pub max_sessions: usize,
    /// Live sessions held by one client identity
    pub max_sessions_per_client: usize,
    /// Minimum gap between sweeps of expired sessions
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1440),
            cookie_name: "contact_session".to_string(),
            max_sessions: 10_000,
            max_sessions_per_client: 20,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Redirect targets for plain form posts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub success: String,
    pub failure: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            success: "thank-you.html".to_string(),
            failure: "error.html".to_string(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {error}")]
    Io { path: String, error: String },
    /// Config file is not valid TOML for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Malformed mail address
    #[error("invalid mail address: {0}")]
    InvalidAddress(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
