use clap::ValueEnum;
use serde::Deserialize;

use crate::utils::constants::{DEFAULT_AUTHORITY_HOST, DEFAULT_CLI_PROGRAM, DEFAULT_IMDS_ENDPOINT};

/// Which family of identity mechanisms the process should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Local workstation: developer sessions and service principals.
    Development,
    /// Hosted workload: managed identity.
    #[default]
    Production,
}

/// Strategies allowed in the development chain, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevCredentialKind {
    CliSession,
    EnvironmentVars,
    ManagedIdentity,
}

/// How a user-assigned managed identity is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserAssignedIdKind {
    #[default]
    ObjectId,
    ClientId,
}

/// ================================
/// Identity selection
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default)]
    pub runtime_mode: RuntimeMode,
    /// Empty selects the system-assigned identity.
    #[serde(default)]
    pub user_assigned_id: String,
    #[serde(default)]
    pub user_assigned_id_kind: UserAssignedIdKind,
    #[serde(default = "default_development_chain")]
    pub development_chain: Vec<DevCredentialKind>,
    #[serde(default = "default_cli_program")]
    pub cli_program: String,
    #[serde(default)]
    pub managed_identity: ManagedIdentityEndpointConfig,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default)]
    pub service_principal: ServicePrincipalConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            runtime_mode: RuntimeMode::default(),
            user_assigned_id: String::new(),
            user_assigned_id_kind: UserAssignedIdKind::default(),
            development_chain: default_development_chain(),
            cli_program: default_cli_program(),
            managed_identity: ManagedIdentityEndpointConfig::default(),
            authority_host: default_authority_host(),
            service_principal: ServicePrincipalConfig::default(),
        }
    }
}

/// Where managed identity tokens come from.
///
/// `identity_endpoint` + `identity_header` select the App Service flavour, otherwise IMDS is used.
#[derive(Debug, Deserialize, Clone)]
pub struct ManagedIdentityEndpointConfig {
    #[serde(default = "default_imds_endpoint")]
    pub imds_endpoint: String,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
}

impl Default for ManagedIdentityEndpointConfig {
    fn default() -> Self {
        Self {
            imds_endpoint: default_imds_endpoint(),
            identity_endpoint: None,
            identity_header: None,
        }
    }
}

/// Client-credentials service principal, normally filled from `AZURE_*` variables.
#[derive(Deserialize, Clone, Default)]
pub struct ServicePrincipalConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for ServicePrincipalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

fn default_development_chain() -> Vec<DevCredentialKind> {
    vec![DevCredentialKind::CliSession, DevCredentialKind::EnvironmentVars]
}

fn default_cli_program() -> String {
    DEFAULT_CLI_PROGRAM.to_string()
}

fn default_imds_endpoint() -> String {
    DEFAULT_IMDS_ENDPOINT.to_string()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}
