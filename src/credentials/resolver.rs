use reqwest::Client;
use tracing::info;

use crate::config::identity::{DevCredentialKind, IdentityConfig, RuntimeMode};
use crate::credentials::cli_session::CliSessionCredential;
use crate::credentials::environment::EnvironmentCredential;
use crate::credentials::managed_identity::{ManagedIdentityCredential, ManagedIdentityKind};
use crate::credentials::Credential;

/// Builds the process credential. Construction only: no network call happens
/// here and nothing can fail until the first token request.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    client: Client,
}

impl CredentialResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn resolve(&self, mode: RuntimeMode, identity: &IdentityConfig) -> Credential {
        let credential = match mode {
            RuntimeMode::Development => Credential::Chained(
                identity
                    .development_chain
                    .iter()
                    .map(|kind| self.development_member(*kind, identity))
                    .collect(),
            ),
            RuntimeMode::Production => self.managed_identity(identity),
        };
        info!(mode = ?mode, credential = %credential.name(), "credential resolved");
        credential
    }

    fn development_member(&self, kind: DevCredentialKind, identity: &IdentityConfig) -> Credential {
        match kind {
            DevCredentialKind::CliSession => {
                Credential::CliSession(CliSessionCredential::new(identity.cli_program.clone()))
            }
            DevCredentialKind::EnvironmentVars => Credential::EnvironmentVars(EnvironmentCredential::new(
                &identity.service_principal,
                &identity.authority_host,
                self.client.clone(),
            )),
            DevCredentialKind::ManagedIdentity => self.managed_identity(identity),
        }
    }

    fn managed_identity(&self, identity: &IdentityConfig) -> Credential {
        let id = identity.user_assigned_id.trim();
        let kind = if id.is_empty() {
            ManagedIdentityKind::SystemAssigned
        } else {
            ManagedIdentityKind::UserAssigned {
                id: id.to_owned(),
                id_kind: identity.user_assigned_id_kind,
            }
        };
        Credential::ManagedIdentity(ManagedIdentityCredential::new(
            kind,
            &identity.managed_identity,
            self.client.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::identity::UserAssignedIdKind;

    fn resolver() -> CredentialResolver {
        CredentialResolver::new(Client::new())
    }

    #[test]
    fn development_uses_configured_chain_order() {
        let mut identity = IdentityConfig::default();
        identity.development_chain = vec![
            DevCredentialKind::EnvironmentVars,
            DevCredentialKind::CliSession,
            DevCredentialKind::ManagedIdentity,
        ];

        match resolver().resolve(RuntimeMode::Development, &identity) {
            Credential::Chained(chain) => {
                assert_eq!(chain.len(), 3);
                assert!(matches!(chain[0], Credential::EnvironmentVars(_)));
                assert!(matches!(chain[1], Credential::CliSession(_)));
                assert!(matches!(chain[2], Credential::ManagedIdentity(_)));
            }
            other => panic!("expected chain, got {}", other.name()),
        }
    }

    #[test]
    fn default_development_chain_is_cli_then_environment() {
        let credential = resolver().resolve(RuntimeMode::Development, &IdentityConfig::default());
        assert_eq!(credential.name(), "Chained[CliSession, EnvironmentVars]");
    }

    #[test]
    fn production_without_id_is_system_assigned() {
        let mut identity = IdentityConfig::default();
        identity.user_assigned_id = "   ".into();

        match resolver().resolve(RuntimeMode::Production, &identity) {
            Credential::ManagedIdentity(mi) => {
                assert_eq!(mi.identity, ManagedIdentityKind::SystemAssigned)
            }
            other => panic!("expected managed identity, got {}", other.name()),
        }
    }

    #[test]
    fn production_with_id_is_user_assigned() {
        let mut identity = IdentityConfig::default();
        identity.user_assigned_id = "9a1b-object".into();

        match resolver().resolve(RuntimeMode::Production, &identity) {
            Credential::ManagedIdentity(mi) => assert_eq!(
                mi.identity,
                ManagedIdentityKind::UserAssigned {
                    id: "9a1b-object".into(),
                    id_kind: UserAssignedIdKind::ObjectId
                }
            ),
            other => panic!("expected managed identity, got {}", other.name()),
        }
    }
}
