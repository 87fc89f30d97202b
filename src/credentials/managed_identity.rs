use std::fmt;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::cache::token::AccessToken;
use crate::config::identity::{ManagedIdentityEndpointConfig, UserAssignedIdKind};
use crate::credentials::response::{parse_token_response, truncate_body};
use crate::credentials::to_resource;
use crate::errors::{RelayError, RelayResult};
use crate::utils::constants::{APP_SERVICE_API_VERSION, IMDS_API_VERSION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityKind {
    SystemAssigned,
    UserAssigned { id: String, id_kind: UserAssignedIdKind },
}

impl fmt::Display for ManagedIdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedIdentityKind::SystemAssigned => write!(f, "system-assigned"),
            ManagedIdentityKind::UserAssigned { id, id_kind } => {
                write!(f, "user-assigned {:?} {}", id_kind, id)
            }
        }
    }
}

/// Where the hosting platform serves managed identity tokens.
#[derive(Clone)]
pub enum ManagedIdentityEndpoint {
    /// Azure Instance Metadata Service (VMs, AKS).
    Imds { url: String },
    /// App Service / Functions local identity endpoint.
    AppService { url: String, header: String },
}

impl fmt::Debug for ManagedIdentityEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedIdentityEndpoint::Imds { url } => f.debug_struct("Imds").field("url", url).finish(),
            ManagedIdentityEndpoint::AppService { url, .. } => f
                .debug_struct("AppService")
                .field("url", url)
                .field("header", &"[redacted]")
                .finish(),
        }
    }
}

impl From<&ManagedIdentityEndpointConfig> for ManagedIdentityEndpoint {
    fn from(cfg: &ManagedIdentityEndpointConfig) -> Self {
        match (&cfg.identity_endpoint, &cfg.identity_header) {
            (Some(url), Some(header)) => ManagedIdentityEndpoint::AppService {
                url: url.clone(),
                header: header.clone(),
            },
            _ => ManagedIdentityEndpoint::Imds {
                url: cfg.imds_endpoint.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    pub identity: ManagedIdentityKind,
    pub endpoint: ManagedIdentityEndpoint,
    client: Client,
}

impl ManagedIdentityCredential {
    pub fn new(
        identity: ManagedIdentityKind,
        endpoint: &ManagedIdentityEndpointConfig,
        client: Client,
    ) -> Self {
        Self {
            identity,
            endpoint: endpoint.into(),
            client,
        }
    }

    pub async fn get_token(&self, scope: &str) -> RelayResult<AccessToken> {
        let resource = to_resource(scope);
        let (url, header) = self.request_parts(resource)?;
        debug!(identity = %self.identity, url = %url, "requesting managed identity token");

        let response = self
            .client
            .get(url.clone())
            .header(header.0, header.1)
            .send()
            .await
            .map_err(|e| {
                // no identity endpoint on this host
                if e.is_connect() || e.is_timeout() {
                    RelayError::CredentialUnavailable(format!(
                        "managed identity endpoint {} unreachable: {}",
                        url.origin().ascii_serialization(),
                        e
                    ))
                } else {
                    RelayError::TokenAcquisition(format!("managed identity request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::TokenAcquisition(format!("managed identity response: {}", e)))?;

        match status {
            s if s.is_success() => parse_token_response(&body),
            // IMDS answers 400 when the requested identity is not assigned
            StatusCode::BAD_REQUEST => Err(RelayError::CredentialUnavailable(format!(
                "managed identity {} not available: {}",
                self.identity,
                truncate_body(&body)
            ))),
            s => Err(RelayError::TokenAcquisition(format!(
                "managed identity endpoint returned {}: {}",
                s,
                truncate_body(&body)
            ))),
        }
    }

    fn request_parts(&self, resource: &str) -> RelayResult<(Url, (&'static str, String))> {
        let (base, api_version, header) = match &self.endpoint {
            ManagedIdentityEndpoint::Imds { url } => (url, IMDS_API_VERSION, ("Metadata", "true".to_owned())),
            ManagedIdentityEndpoint::AppService { url, header } => {
                (url, APP_SERVICE_API_VERSION, ("X-IDENTITY-HEADER", header.clone()))
            }
        };
        let mut url = Url::parse(base).map_err(|e| {
            RelayError::CredentialUnavailable(format!("invalid managed identity endpoint '{}': {}", base, e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let ManagedIdentityKind::UserAssigned { id, id_kind } = &self.identity {
                let key = match (&self.endpoint, id_kind) {
                    (_, UserAssignedIdKind::ClientId) => "client_id",
                    (ManagedIdentityEndpoint::Imds { .. }, UserAssignedIdKind::ObjectId) => "object_id",
                    (ManagedIdentityEndpoint::AppService { .. }, UserAssignedIdKind::ObjectId) => "principal_id",
                };
                query.append_pair(key, id);
            }
        }
        Ok((url, header))
    }
}
