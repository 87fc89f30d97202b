use chrono::Utc;
use tokio::time::Instant;

pub fn now_u64() -> u64 {
    now_i64().max(0) as u64
}

pub fn now_i64() -> i64 {
    Utc::now().timestamp()
}

pub fn get_instant() -> Instant {
    Instant::now()
}

/// Absolute expiry for a provider answer carrying a lifetime in seconds.
pub fn expires_in_to_unix(expires_in_seconds: u64) -> u64 {
    now_u64().saturating_add(expires_in_seconds)
}
