use serde::{Deserialize, Deserializer};

use crate::cache::token::AccessToken;
use crate::errors::{RelayError, RelayResult};
use crate::helpers::time::expires_in_to_unix;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Token answer shared by the v2 token endpoint, IMDS and App Service.
///
/// IMDS and App Service send numbers as strings, the v2 endpoint as numbers.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub expires_in: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub expires_on: Option<u64>,
    pub token_type: Option<String>,
}

impl TokenResponse {
    pub fn into_access_token(self) -> RelayResult<AccessToken> {
        if self.access_token.is_empty() {
            return Err(RelayError::TokenAcquisition(
                "identity provider returned an empty access_token".to_owned(),
            ));
        }
        let expires_at = self
            .expires_on
            .or_else(|| self.expires_in.map(expires_in_to_unix))
            .ok_or_else(|| {
                RelayError::TokenAcquisition(
                    "token response carries neither expires_on nor expires_in".to_owned(),
                )
            })?;
        Ok(AccessToken::new(self.access_token, expires_at))
    }
}

/// Parse a successful token response body.
pub fn parse_token_response(body: &str) -> RelayResult<AccessToken> {
    serde_json::from_str::<TokenResponse>(body)
        .map_err(|e| RelayError::TokenAcquisition(format!("invalid token response: {}", e)))?
        .into_access_token()
}

/// Provider error bodies can be long HTML pages; keep the head only.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_owned();
    }
    let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{}...", head)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
