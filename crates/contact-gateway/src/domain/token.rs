//! Anti-forgery tokens bound to a session record.
//!
//! A token lives until it is rotated or its session ends. Verification is a
//! constant-time equality check against the session's current value.

use rand::RngCore;
use std::fmt;

/// Random bytes per token (hex-encoded on the wire).
pub const TOKEN_BYTES: usize = 32;

/// Opaque high-entropy token
#[derive(Clone, PartialEq, Eq)]
pub struct AntiForgeryToken(String);

impl AntiForgeryToken {
    /// Generate a fresh token from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print token material into logs.
impl fmt::Debug for AntiForgeryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AntiForgeryToken(..)")
    }
}

/// Token state of one session
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    token: Option<AntiForgeryToken>,
    generation: u64,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, generating one if the session has none.
    pub fn issue(&mut self) -> AntiForgeryToken {
        match &self.token {
            Some(token) => token.clone(),
            None => self.rotate(),
        }
    }

    /// Replace the current token. The previous one stops verifying.
    pub fn rotate(&mut self) -> AntiForgeryToken {
        let token = AntiForgeryToken::generate();
        self.token = Some(token.clone());
        self.generation += 1;
        token
    }

    /// True only for the exact current token. Never errors.
    pub fn verify(&self, supplied: &str) -> bool {
        if supplied.is_empty() {
            return false;
        }
        match &self.token {
            Some(current) => constant_time_compare(current.as_str(), supplied),
            None => false,
        }
    }

    /// Number of tokens this session has been issued
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Constant-time string comparison to prevent timing attacks
///
/// Uses `subtle::ConstantTimeEq`; the length check is folded into the same
/// constant-time result so unequal lengths do not short-circuit.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());

    // Different pad bytes guarantee a mismatch when lengths differ
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
