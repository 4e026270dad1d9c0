//! Field sanitization and validation.
//!
//! Cleaning is strip-markup → trim → truncate → trim-end, which makes
//! `sanitize` idempotent. Lengths are counted in characters, not bytes.

use crate::domain::config::{FormConfig, MIN_MESSAGE_CHARS};
use crate::domain::types::{
    FieldError, FieldErrors, FieldName, OptionalField, SubmissionRequest, ValidatedSubmission,
    DEFAULT_FORM_TYPE,
};
use std::collections::BTreeMap;

/// Minimum name length in characters.
pub const MIN_NAME_CHARS: usize = 2;

/// Names longer than this are truncated.
pub const NAME_MAX_CHARS: usize = 200;

/// RFC 5321 path limit.
pub const EMAIL_MAX_CHARS: usize = 254;

const LOCAL_PART_MAX: usize = 64;
const DOMAIN_LABEL_MAX: usize = 63;

/// Remove markup. A `<` opens a tag only when a non-whitespace character
/// follows it; the tag runs to the next `>`, or swallows the rest of the
/// input when unterminated. A `<` before whitespace or at the very end is
/// plain text. NUL bytes are dropped.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\0' => {}
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '<' if chars.peek().map_or(true, |next| next.is_whitespace()) => out.push(c),
            '<' => in_tag = true,
            _ => out.push(c),
        }
    }

    out
}

/// Trim and strip markup, truncating to `max_chars` when a cap is given.
pub fn sanitize(input: &str, max_chars: Option<usize>) -> String {
    let stripped = strip_tags(input);
    let trimmed = stripped.trim();

    match max_chars {
        Some(max) if trimmed.chars().count() > max => {
            let truncated: String = trimmed.chars().take(max).collect();
            truncated.trim_end().to_string()
        }
        _ => trimmed.to_string(),
    }
}

/// Address grammar check: dot-atom local part, dotted hostname domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.chars().count() > EMAIL_MAX_CHARS {
        return false;
    }
    if email.contains(['<', '>']) {
        return false;
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };

    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

    if local.is_empty() || local.len() > LOCAL_PART_MAX {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }

    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || ATEXT_SPECIALS.contains(c))
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= DOMAIN_LABEL_MAX
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld_ok = labels
        .last()
        .map(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);

    labels_ok && tld_ok
}

/// Cleaned `form_type` of a request, capped like every optional field.
pub fn form_type_of(request: &SubmissionRequest, config: &FormConfig) -> String {
    request
        .field(OptionalField::FormType.as_str())
        .map(|raw| sanitize(raw, Some(config.optional_field_max)))
        .filter(|cleaned| !cleaned.is_empty())
        .unwrap_or_else(|| DEFAULT_FORM_TYPE.to_string())
}

/// Validate a request, collecting every field error.
pub fn validate(
    request: &SubmissionRequest,
    config: &FormConfig,
) -> Result<ValidatedSubmission, FieldErrors> {
    let mut errors = FieldErrors::default();

    let name = sanitize(request.field("name").unwrap_or(""), Some(NAME_MAX_CHARS));
    if name.is_empty() {
        errors.insert(FieldName::Name, FieldError::Required);
    } else if name.chars().count() < MIN_NAME_CHARS {
        errors.insert(FieldName::Name, FieldError::TooShort(MIN_NAME_CHARS));
    }

    let email = sanitize(request.field("email").unwrap_or(""), None);
    if email.is_empty() {
        errors.insert(FieldName::Email, FieldError::Required);
    } else if !is_valid_email(&email) {
        errors.insert(FieldName::Email, FieldError::InvalidFormat);
    }

    let message = sanitize(request.field("message").unwrap_or(""), None);
    let message_len = message.chars().count();
    if message.is_empty() {
        errors.insert(FieldName::Message, FieldError::Required);
    } else if message_len < MIN_MESSAGE_CHARS {
        errors.insert(FieldName::Message, FieldError::TooShort(MIN_MESSAGE_CHARS));
    } else if message_len > config.max_message_length {
        errors.insert(
            FieldName::Message,
            FieldError::TooLong(config.max_message_length),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let extras: BTreeMap<OptionalField, String> = OptionalField::ALL
        .iter()
        .filter_map(|field| {
            let raw = request.field(field.as_str())?;
            let cleaned = sanitize(raw, Some(config.optional_field_max));
            (!cleaned.is_empty()).then_some((*field, cleaned))
        })
        .collect();

    Ok(ValidatedSubmission::new(name, email, message, extras))
}
