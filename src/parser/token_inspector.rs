//! Structural JWT decoding for diagnostics.
//!
//! The signature segment is never checked: nothing decoded here may be used
//! to make a trust decision.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{RelayError, RelayResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedToken {
    pub header: Map<String, Value>,
    pub claims: Map<String, Value>,
}

impl DecodedToken {
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// `aud` may be a single string or an array.
    pub fn audiences(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.claims.get("exp").and_then(Value::as_u64)
    }
}

pub fn decode(token: &str) -> RelayResult<DecodedToken> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(RelayError::Decode(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    Ok(DecodedToken {
        header: decode_segment("header", segments[0])?,
        claims: decode_segment("payload", segments[1])?,
    })
}

/// Decoded claims when a token is present and well formed, `None` otherwise.
pub fn inspect(token: Option<&str>) -> Option<DecodedToken> {
    let token = token.filter(|t| !t.trim().is_empty())?;
    decode(token)
        .inspect_err(|e| debug!(error = %e, "token is not a decodable jwt"))
        .ok()
}

fn decode_segment(name: &str, segment: &str) -> RelayResult<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| RelayError::Decode(format!("{} is not base64url: {}", name, e)))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RelayError::Decode(format!("{} is not a json object", name))),
        Err(e) => Err(RelayError::Decode(format!("{} is not json: {}", name, e))),
    }
}
