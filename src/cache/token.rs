use std::fmt;

use crate::helpers::time::now_u64;

const VISIBLE_PREFIX_LEN: usize = 6;

/// Bearer token issued by an identity provider.
///
/// The value is a secret: `Debug` never prints it and logs only carry [`AccessToken::redacted`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: u64, // UNIX TIMESTAMP
}

impl AccessToken {
    pub fn new(value: String, expires_at: u64) -> Self {
        Self { value, expires_at }
    }

    /// True once `now + safety_margin_seconds` has reached the expiry.
    pub fn is_expired(&self, safety_margin_seconds: u64) -> bool {
        now_u64().saturating_add(safety_margin_seconds) >= self.expires_at
    }

    pub fn redacted(&self) -> String {
        redact(&self.value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Short prefix of a secret, safe to put in logs.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(VISIBLE_PREFIX_LEN).collect();
    format!("{}...", prefix)
}
