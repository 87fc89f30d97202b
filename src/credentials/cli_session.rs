use std::io::ErrorKind;
use std::process::Stdio;

use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::cache::token::AccessToken;
use crate::credentials::response::truncate_body;
use crate::errors::{RelayError, RelayResult};
use crate::utils::constants::SCOPE_DEFAULT_SUFFIX;

/// Token from the developer's signed-in Azure CLI session.
#[derive(Debug, Clone)]
pub struct CliSessionCredential {
    program: String,
}

/// `az account get-access-token --output json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Local time, e.g. `2024-01-01 10:00:00.000000`.
    expires_on: Option<String>,
    /// Unix seconds; only printed by newer CLI versions.
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

impl CliSessionCredential {
    pub fn new(program: String) -> Self {
        Self { program }
    }

    pub async fn get_token(&self, scope: &str) -> RelayResult<AccessToken> {
        let (flag, value) = if scope.ends_with(SCOPE_DEFAULT_SUFFIX) {
            ("--scope", scope)
        } else {
            ("--resource", scope)
        };
        debug!(program = %self.program, flag, value, "requesting token from cli session");

        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", flag, value])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => RelayError::CredentialUnavailable(format!(
                    "cli '{}' not found on PATH",
                    self.program
                )),
                _ => RelayError::CredentialUnavailable(format!(
                    "failed to run cli '{}': {}",
                    self.program, e
                )),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("az login") {
                return Err(RelayError::CredentialUnavailable(
                    "cli session not signed in, run 'az login'".to_owned(),
                ));
            }
            return Err(RelayError::TokenAcquisition(format!(
                "cli exited with {}: {}",
                output.status,
                truncate_body(stderr.trim())
            )));
        }

        parse_cli_output(&output.stdout)
    }
}

pub fn parse_cli_output(stdout: &[u8]) -> RelayResult<AccessToken> {
    let response: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| RelayError::TokenAcquisition(format!("invalid cli token output: {}", e)))?;

    let expires_at = match (response.expires_on_unix, &response.expires_on) {
        (Some(unix), _) => unix,
        (None, Some(local)) => parse_local_time(local)?,
        (None, None) => {
            return Err(RelayError::TokenAcquisition(
                "cli token output has no expiry".to_owned(),
            ))
        }
    };

    Ok(AccessToken::new(response.access_token, expires_at.max(0) as u64))
}

fn parse_local_time(value: &str) -> RelayResult<i64> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| RelayError::TokenAcquisition(format!("invalid cli expiresOn '{}': {}", value, e)))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| RelayError::TokenAcquisition(format!("ambiguous cli expiresOn '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_expiry_is_preferred() {
        let token = parse_cli_output(
            br#"{"accessToken":"cli-token","expiresOn":"2024-01-01 10:00:00.000000","expires_on":1704103200,"tenant":"t","tokenType":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.value, "cli-token");
        assert_eq!(token.expires_at, 1_704_103_200);
    }

    #[test]
    fn local_expiry_is_parsed_when_unix_missing() {
        let token = parse_cli_output(
            br#"{"accessToken":"cli-token","expiresOn":"2030-06-01 12:30:00.123456","tokenType":"Bearer"}"#,
        )
        .unwrap();
        let expected = Local
            .with_ymd_and_hms(2030, 6, 1, 12, 30, 0)
            .earliest()
            .unwrap()
            .timestamp() as u64;
        assert_eq!(token.expires_at, expected);
    }

    #[test]
    fn garbage_output_is_rejected() {
        assert!(parse_cli_output(b"ERROR: something").is_err());
        assert!(parse_cli_output(br#"{"accessToken":"x"}"#).is_err());
    }

    #[tokio::test]
    async fn missing_cli_is_unavailable() {
        let credential = CliSessionCredential::new("token-relay-no-such-cli".into());
        let err = credential.get_token("api://callee/.default").await.unwrap_err();
        assert_eq!(err.kind(), "credential_unavailable");
    }
}
