use std::{fs, path::Path};

use anyhow::{anyhow, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::identity::UserAssignedIdKind;
use crate::config::proc_validator;
use crate::config::service::{CalleeServiceConfig, ServiceConfig};
use crate::config::settings::LoggingConfig;
use crate::observability::metrics::get_metrics;

// Environment keys the relay honours on top of the YAML file.
pub const ENV_CALLEE_APP_REGISTRATION_ID: &str = "CalleeAppRegistrationId";
pub const ENV_CALLEE_API: &str = "CalleeApi";
pub const ENV_MANAGED_IDENTITY_OBJECT_ID: &str = "ManagedIdentityObjectId";
pub const ENV_MANAGED_IDENTITY_CLIENT_ID: &str = "ManagedIdentity";
pub const ENV_DEFAULT_SCOPE: &str = "DefaultScope";
pub const ENV_AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";

/// Load, overlay and validate the relay config from a YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = fs::read_to_string(path)?;
    let expanded = expand_env_vars(&content)?;
    parse_config(expanded, |key| std::env::var(key).ok()).await
}

pub async fn parse_config<L>(content: String, lookup: L) -> Result<ServiceConfig>
where
    L: Fn(&str) -> Option<String>,
{
    let mut service_config: ServiceConfig = parse_yaml(&content).await?;

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::default());
    }
    apply_env_overrides(&mut service_config, lookup);

    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config)
        .await
        .map_err(|errors| anyhow!("config is not valid: {}", errors.join("; ")))?;

    Ok(service_config)
}

/// Load the callee config. A missing file yields defaults.
pub async fn file_to_callee_config(path: &Path) -> Result<CalleeServiceConfig> {
    if !path.exists() {
        debug!("callee config {} not found, using defaults", path.display());
        return Ok(CalleeServiceConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let expanded = expand_env_vars(&content)?;
    let mut config: CalleeServiceConfig = parse_yaml(&expanded).await?;
    if config.settings.logging.is_none() {
        config.settings.logging = Some(LoggingConfig::default());
    }
    Ok(config)
}

async fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T> {
    let metrics = get_metrics().await;
    serde_yaml::from_str(content)
        .inspect_err(|e| {
            error!("parse config error: {}", e);
            metrics.config_parse_failures.inc();
        })
        .map_err(|e| anyhow!(e))
}

/// Overlay the flat environment keys the relay has always been configured with.
pub fn apply_env_overrides<L>(config: &mut ServiceConfig, lookup: L)
where
    L: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

    if let Some(v) = get(ENV_CALLEE_APP_REGISTRATION_ID) {
        config.callee.app_registration_id = Some(v);
    }
    if let Some(v) = get(ENV_CALLEE_API) {
        config.callee.api = v;
    }
    if let Some(v) = get(ENV_DEFAULT_SCOPE) {
        config.callee.default_scope = Some(v);
    }

    // object id wins when both selectors are present
    if let Some(v) = get(ENV_MANAGED_IDENTITY_CLIENT_ID) {
        config.identity.user_assigned_id = v;
        config.identity.user_assigned_id_kind = UserAssignedIdKind::ClientId;
    }
    if let Some(v) = get(ENV_MANAGED_IDENTITY_OBJECT_ID) {
        config.identity.user_assigned_id = v;
        config.identity.user_assigned_id_kind = UserAssignedIdKind::ObjectId;
    }

    let principal = &mut config.identity.service_principal;
    if let Some(v) = get(ENV_AZURE_TENANT_ID) {
        principal.tenant_id = Some(v);
    }
    if let Some(v) = get(ENV_AZURE_CLIENT_ID) {
        principal.client_id = Some(v);
    }
    if let Some(v) = get(ENV_AZURE_CLIENT_SECRET) {
        principal.client_secret = Some(v);
    }

    let managed = &mut config.identity.managed_identity;
    if let Some(v) = get(ENV_IDENTITY_ENDPOINT) {
        managed.identity_endpoint = Some(v);
    }
    if let Some(v) = get(ENV_IDENTITY_HEADER) {
        managed.identity_header = Some(v);
    }
}

/// Replace `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]*))?\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use serial_test::serial;

    use super::*;
    use crate::config::identity::{DevCredentialKind, RuntimeMode};
    use crate::config::settings::LogFormat;

    const MINIMAL: &str = r#"
identity:
  runtime_mode: development
callee:
  app_registration_id: api://callee-app/.default
  api: http://localhost:5001/
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn minimal_yaml_gets_defaults() {
        let cfg = parse_config(MINIMAL.to_owned(), no_env).await.unwrap();

        assert_eq!(cfg.identity.runtime_mode, RuntimeMode::Development);
        assert_eq!(
            cfg.identity.development_chain,
            vec![DevCredentialKind::CliSession, DevCredentialKind::EnvironmentVars]
        );
        assert_eq!(cfg.settings.server.port, "8080");
        assert_eq!(cfg.settings.broker.safety_margin_seconds, 30);
        assert_eq!(cfg.settings.logging.unwrap().format, LogFormat::Compact);
        assert_eq!(cfg.callee.default_scope().as_deref(), Some("api://callee-app/.default"));
    }

    #[tokio::test]
    async fn environment_keys_override_yaml() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CalleeApi", "https://callee.internal/"),
            ("DefaultScope", "api://override/.default"),
            ("ManagedIdentity", "client-guid"),
            ("ManagedIdentityObjectId", "object-guid"),
            ("AZURE_CLIENT_SECRET", "s3cret"),
            ("IDENTITY_ENDPOINT", "http://127.0.0.1:41741/msi/token"),
            ("IDENTITY_HEADER", "header-secret"),
        ]);
        let cfg = parse_config(MINIMAL.to_owned(), |k| env.get(k).map(|v| v.to_string()))
            .await
            .unwrap();

        assert_eq!(cfg.callee.api, "https://callee.internal/");
        assert_eq!(cfg.callee.default_scope().as_deref(), Some("api://override/.default"));
        assert_eq!(cfg.identity.user_assigned_id, "object-guid");
        assert_eq!(cfg.identity.user_assigned_id_kind, UserAssignedIdKind::ObjectId);
        assert_eq!(cfg.identity.service_principal.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(
            cfg.identity.managed_identity.identity_endpoint.as_deref(),
            Some("http://127.0.0.1:41741/msi/token")
        );
        assert_eq!(
            cfg.identity.managed_identity.identity_header.as_deref(),
            Some("header-secret")
        );
    }

    #[tokio::test]
    async fn identity_endpoint_without_header_is_rejected() {
        let env: HashMap<&str, &str> =
            HashMap::from([("IDENTITY_ENDPOINT", "http://127.0.0.1:41741/msi/token")]);
        let err = parse_config(MINIMAL.to_owned(), |k| env.get(k).map(|v| v.to_string()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be set together"), "{}", err);
    }

    #[tokio::test]
    async fn missing_callee_api_is_rejected() {
        let yaml = "callee:\n  app_registration_id: api://x/.default\n".to_owned();
        let err = parse_config(yaml, no_env).await.unwrap_err();
        assert!(err.to_string().contains("config is not valid"));
        assert!(err.to_string().contains("callee.api"));
    }

    #[tokio::test]
    #[serial]
    async fn file_placeholders_expand_from_environment() {
        std::env::set_var("TOKEN_RELAY_TEST_CALLEE", "http://callee.test:9000/");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "callee:\n  app_registration_id: ${{TOKEN_RELAY_TEST_SCOPE:api://fallback/.default}}\n  api: ${{TOKEN_RELAY_TEST_CALLEE}}\n"
        )
        .unwrap();

        let cfg = file_to_config(file.path()).await.unwrap();
        std::env::remove_var("TOKEN_RELAY_TEST_CALLEE");

        assert_eq!(cfg.callee.api, "http://callee.test:9000/");
        assert_eq!(cfg.callee.app_registration_id.as_deref(), Some("api://fallback/.default"));
    }

    #[tokio::test]
    async fn missing_callee_file_yields_defaults() {
        let cfg = file_to_callee_config(Path::new("/nonexistent/token-relay-callee.yaml"))
            .await
            .unwrap();
        assert!(cfg.expected_audience.is_none());
        assert_eq!(cfg.settings.server.host, "0.0.0.0");
    }
}
