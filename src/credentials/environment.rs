use std::fmt;

use reqwest::Client;
use tracing::debug;

use crate::cache::token::AccessToken;
use crate::config::identity::ServicePrincipalConfig;
use crate::credentials::response::{parse_token_response, truncate_body};
use crate::credentials::to_default_scope;
use crate::errors::{RelayError, RelayResult};

/// Service principal with a client secret, taken from `AZURE_TENANT_ID`,
/// `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
#[derive(Clone)]
pub struct EnvironmentCredential {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    authority_host: String,
    client: Client,
}

impl fmt::Debug for EnvironmentCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl EnvironmentCredential {
    pub fn new(principal: &ServicePrincipalConfig, authority_host: &str, client: Client) -> Self {
        Self {
            tenant_id: principal.tenant_id.clone(),
            client_id: principal.client_id.clone(),
            client_secret: principal.client_secret.clone(),
            authority_host: authority_host.trim_end_matches('/').to_owned(),
            client,
        }
    }

    pub async fn get_token(&self, scope: &str) -> RelayResult<AccessToken> {
        let (tenant_id, client_id, client_secret) =
            match (&self.tenant_id, &self.client_id, &self.client_secret) {
                (Some(t), Some(c), Some(s)) => (t, c, s),
                _ => {
                    return Err(RelayError::CredentialUnavailable(
                        "environment credential incomplete: AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET must be set"
                            .to_owned(),
                    ))
                }
            };

        let token_url = format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id);
        let scope = to_default_scope(scope);
        debug!(url = %token_url, scope = %scope, client_id = %client_id, "requesting client credentials token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RelayError::TokenAcquisition(format!("failed to request token: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::TokenAcquisition(format!("token response: {}", e)))?;

        if !status.is_success() {
            return Err(RelayError::TokenAcquisition(format!(
                "token request failed with status {}: {}",
                status,
                truncate_body(&body)
            )));
        }
        parse_token_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn principal() -> ServicePrincipalConfig {
        ServicePrincipalConfig {
            tenant_id: Some("tenant-1".into()),
            client_id: Some("client-1".into()),
            client_secret: Some("secret-1".into()),
        }
    }

    #[tokio::test]
    async fn incomplete_principal_is_unavailable() {
        let mut p = principal();
        p.client_secret = None;
        let credential = EnvironmentCredential::new(&p, "http://127.0.0.1:1", Client::new());

        let err = credential.get_token("api://callee").await.unwrap_err();
        assert_eq!(err.kind(), "credential_unavailable");
        assert!(!format!("{:?}", EnvironmentCredential::new(&principal(), "h", Client::new()))
            .contains("secret-1"));
    }

    #[tokio::test]
    async fn client_credentials_grant_posts_default_scope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tenant-1/oauth2/v2.0/token")
                    .body_includes("grant_type=client_credentials")
                    .body_includes("client_id=client-1")
                    .body_includes("client_secret=secret-1")
                    .body_includes("scope=api%3A%2F%2Fcallee%2F.default");
                then.status(200).json_body(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "ext_expires_in": 3599,
                    "access_token": "sp-token"
                }));
            })
            .await;

        let credential = EnvironmentCredential::new(&principal(), &server.base_url(), Client::new());
        let token = credential.get_token("api://callee").await.unwrap();

        assert_eq!(token.value, "sp-token");
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn rejected_grant_is_acquisition_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tenant-1/oauth2/v2.0/token");
                then.status(401).json_body(json!({
                    "error": "invalid_client",
                    "error_description": "AADSTS7000215: Invalid client secret provided."
                }));
            })
            .await;

        let credential = EnvironmentCredential::new(&principal(), &server.base_url(), Client::new());
        let err = credential.get_token("api://callee/.default").await.unwrap_err();

        assert_eq!(err.kind(), "token_acquisition");
        assert!(err.to_string().contains("AADSTS7000215"));
    }
}
