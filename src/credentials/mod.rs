//! Identity mechanisms that turn a scope into an access token.
//!
//! [`Credential`] is a tagged variant over the supported strategies. The
//! [`resolver`] picks one (or an ordered chain) for the runtime mode.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::cache::token::AccessToken;
use crate::errors::{RelayError, RelayResult};
use crate::utils::constants::SCOPE_DEFAULT_SUFFIX;

pub mod cli_session;
pub mod environment;
pub mod managed_identity;
pub mod resolver;
pub mod response;

use cli_session::CliSessionCredential;
use environment::EnvironmentCredential;
use managed_identity::ManagedIdentityCredential;

/// Anything that can produce a token for a scope.
///
/// The broker only talks to this trait, so tests can swap in counting or
/// failing implementations.
pub trait GetToken: Send + Sync {
    fn get_token<'a>(&'a self, scope: &'a str) -> BoxFuture<'a, RelayResult<AccessToken>>;
}

#[derive(Debug, Clone)]
pub enum Credential {
    CliSession(CliSessionCredential),
    EnvironmentVars(EnvironmentCredential),
    ManagedIdentity(ManagedIdentityCredential),
    /// Tried in order; the first member that authenticates wins.
    Chained(Vec<Credential>),
}

impl Credential {
    pub fn name(&self) -> String {
        match self {
            Credential::CliSession(_) => "CliSession".to_owned(),
            Credential::EnvironmentVars(_) => "EnvironmentVars".to_owned(),
            Credential::ManagedIdentity(c) => format!("ManagedIdentity({})", c.identity),
            Credential::Chained(chain) => format!(
                "Chained[{}]",
                chain.iter().map(Credential::name).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl GetToken for Credential {
    fn get_token<'a>(&'a self, scope: &'a str) -> BoxFuture<'a, RelayResult<AccessToken>> {
        async move {
            match self {
                Credential::CliSession(c) => c.get_token(scope).await,
                Credential::EnvironmentVars(c) => c.get_token(scope).await,
                Credential::ManagedIdentity(c) => c.get_token(scope).await,
                Credential::Chained(chain) => chained_token(chain, scope).await,
            }
        }
        .boxed()
    }
}

async fn chained_token(chain: &[Credential], scope: &str) -> RelayResult<AccessToken> {
    if chain.is_empty() {
        return Err(RelayError::CredentialUnavailable(
            "credential chain is empty".to_owned(),
        ));
    }

    let mut failures = Vec::with_capacity(chain.len());
    for credential in chain {
        match credential.get_token(scope).await {
            Ok(token) => {
                debug!(credential = %credential.name(), scope, "chain member authenticated");
                return Ok(token);
            }
            Err(e) => {
                debug!(credential = %credential.name(), scope, error = %e, "chain member failed");
                failures.push(format!("{}: {}", credential.name(), e));
            }
        }
    }

    warn!(scope, "no credential in the chain authenticated");
    Err(RelayError::CredentialUnavailable(format!(
        "no credential in the chain authenticated [{}]",
        failures.join("; ")
    )))
}

/// `api://app` -> `api://app/.default`, as the v2 token endpoint expects.
pub fn to_default_scope(scope: &str) -> String {
    if scope.ends_with(SCOPE_DEFAULT_SUFFIX) {
        scope.to_owned()
    } else {
        format!("{}{}", scope.trim_end_matches('/'), SCOPE_DEFAULT_SUFFIX)
    }
}

/// `api://app/.default` -> `api://app`, as managed identity endpoints expect.
pub fn to_resource(scope: &str) -> &str {
    scope.strip_suffix(SCOPE_DEFAULT_SUFFIX).unwrap_or(scope)
}
