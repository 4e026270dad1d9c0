//! Core data model: inbound requests, validated submissions and the records
//! written to the durable logs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// FIELDS
// =============================================================================

/// Required form fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldName {
    Name,
    Email,
    Message,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Name => "name",
            FieldName::Email => "email",
            FieldName::Message => "message",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldName::Name => "Name",
            FieldName::Email => "Email",
            FieldName::Message => "Message",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional free-form metadata fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalField {
    Company,
    Role,
    Phone,
    FormType,
    CompanySize,
    PrimaryInterest,
    Challenge,
    Package,
}

impl OptionalField {
    pub const ALL: [OptionalField; 8] = [
        OptionalField::Company,
        OptionalField::Role,
        OptionalField::Phone,
        OptionalField::FormType,
        OptionalField::CompanySize,
        OptionalField::PrimaryInterest,
        OptionalField::Challenge,
        OptionalField::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionalField::Company => "company",
            OptionalField::Role => "role",
            OptionalField::Phone => "phone",
            OptionalField::FormType => "form_type",
            OptionalField::CompanySize => "company_size",
            OptionalField::PrimaryInterest => "primary_interest",
            OptionalField::Challenge => "challenge",
            OptionalField::Package => "package",
        }
    }
}

/// Why a single field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// Absent or empty after cleaning
    Required,
    /// Shorter than the minimum character count
    TooShort(usize),
    /// Longer than the maximum character count
    TooLong(usize),
    /// Present but malformed
    InvalidFormat,
}

impl FieldError {
    /// Message for display next to the field
    pub fn message(&self, field: FieldName) -> String {
        match (self, field) {
            (FieldError::Required, f) => format!("{} is required.", f.label()),
            (FieldError::InvalidFormat, FieldName::Email) => {
                "Please enter a valid email address.".to_string()
            }
            (FieldError::InvalidFormat, f) => format!("{} is not valid.", f.label()),
            (FieldError::TooShort(min), f) => {
                format!("{} must be at least {} characters.", f.label(), min)
            }
            (FieldError::TooLong(_), f) => format!("{} is too long.", f.label()),
        }
    }
}

/// Every field error found in one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<FieldName, FieldError>);

impl FieldErrors {
    pub fn insert(&mut self, field: FieldName, error: FieldError) {
        self.0.insert(field, error);
    }

    pub fn get(&self, field: FieldName) -> Option<FieldError> {
        self.0.get(&field).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.0.keys().copied()
    }

    /// Field name → display message
    pub fn messages(&self) -> BTreeMap<&'static str, String> {
        self.0
            .iter()
            .map(|(field, error)| (field.as_str(), error.message(*field)))
            .collect()
    }
}

impl Serialize for FieldErrors {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.messages().serialize(serializer)
    }
}

// =============================================================================
// REQUEST
// =============================================================================

/// How the caller wants the result delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Programmatic caller, structured JSON result
    Interactive,
    /// Plain form post, redirect to a result page
    Redirect,
}

/// Resolved network identity of the submitter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<std::net::IpAddr> for ClientIdentity {
    fn from(ip: std::net::IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound submission attempt, immutable once built.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    request_id: Uuid,
    method: String,
    fields: HashMap<String, String>,
    client: ClientIdentity,
    received_at: DateTime<Utc>,
    mode: ResponseMode,
    user_agent: Option<String>,
    referer: Option<String>,
    oversized_body: bool,
}

impl SubmissionRequest {
    /// Build a request; on repeated keys the first value wins.
    pub fn new<I, K, V>(method: impl Into<String>, fields: I, client: ClientIdentity) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = HashMap::new();
        for (k, v) in fields {
            map.entry(k.into()).or_insert_with(|| v.into());
        }

        Self {
            request_id: Uuid::new_v4(),
            method: method.into(),
            fields: map,
            client,
            received_at: Utc::now(),
            mode: ResponseMode::Interactive,
            user_agent: None,
            referer: None,
            oversized_body: false,
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    /// Mark a request whose body was over the limit and never read.
    pub fn with_oversized_body(mut self) -> Self {
        self.oversized_body = true;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }

    pub fn has_oversized_body(&self) -> bool {
        self.oversized_body
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn client(&self) -> &ClientIdentity {
        &self.client
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    /// Anti-forgery token, accepting the legacy `csrf` alias.
    pub fn csrf_token(&self) -> &str {
        self.field("csrf_token")
            .or_else(|| self.field("csrf"))
            .unwrap_or("")
    }
}

// =============================================================================
// VALIDATED SUBMISSION
// =============================================================================

/// Form type recorded when the caller names none
pub const DEFAULT_FORM_TYPE: &str = "contact";

/// A submission whose every required field passed validation.
///
/// Only `validation::validate` constructs this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedSubmission {
    name: String,
    email: String,
    message: String,
    #[serde(flatten)]
    extras: BTreeMap<OptionalField, String>,
}

impl ValidatedSubmission {
    pub(crate) fn new(
        name: String,
        email: String,
        message: String,
        extras: BTreeMap<OptionalField, String>,
    ) -> Self {
        Self {
            name,
            email,
            message,
            extras,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn optional(&self, field: OptionalField) -> Option<&str> {
        self.extras.get(&field).map(String::as_str)
    }

    /// Form category, `contact` when the caller did not send one.
    pub fn form_type(&self) -> &str {
        self.optional(OptionalField::FormType).unwrap_or(DEFAULT_FORM_TYPE)
    }

    /// Raw form representation, suitable for re-validation.
    pub fn to_form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("name".to_string(), self.name.clone()),
            ("email".to_string(), self.email.clone()),
            ("message".to_string(), self.message.clone()),
        ];
        fields.extend(
            self.extras
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.clone())),
        );
        fields
    }
}

// =============================================================================
// DURABLE RECORDS
// =============================================================================

/// One admission in the rate-limit log: `timestamp|clientIdentity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Unix seconds
    pub timestamp: u64,
    pub client: String,
}

impl RateLimitEntry {
    pub fn new(timestamp: u64, client: impl Into<String>) -> Self {
        Self {
            timestamp,
            client: client.into(),
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}|{}", self.timestamp, self.client)
    }

    /// Parse one log line; malformed lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (ts, client) = line.trim().split_once('|')?;
        let timestamp = ts.trim().parse().ok()?;
        if client.is_empty() {
            return None;
        }
        Some(Self::new(timestamp, client))
    }
}

/// Attempt outcome as recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One immutable audit line. Never carries the message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLogRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub client: ClientIdentity,
    pub user_agent: String,
    pub form_type: String,
    pub message_length: usize,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<String>,
}

/// Full submission kept for manual recovery when delivery fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub client: ClientIdentity,
    pub submission: ValidatedSubmission,
}

impl FallbackRecord {
    /// `timestamp | serialized-submission`
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "{} | {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            serde_json::to_string(self)?
        ))
    }
}
