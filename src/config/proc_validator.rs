//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates:
//!   * server / logging / metrics / timeout settings
//!   * callee base uri and default scope
//!   * identity chain and managed identity endpoint pairing

use std::collections::HashSet;

use tracing::{error, info};
use url::Url;

use crate::config::identity::IdentityConfig;
use crate::config::service::{CalleeConfig, ServiceConfig};
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);
    validate_callee(&cfg.callee, &mut errors);
    validate_identity(&cfg.identity, &mut errors);

    if errors.is_empty() {
        info!("config is valid");
        Ok(())
    } else {
        let metrics = get_metrics().await;
        for e in &errors {
            error!("config validation: {}", e);
            metrics.config_validation_errors.inc();
        }
        Err(errors)
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' is not a valid port",
            settings.server.port
        ));
    }
    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' must be one of {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
    if settings.metrics.is_enabled && !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }
    if settings.broker.acquire_timeout_ms == 0 {
        errors.push("settings.broker.acquire_timeout_ms must be > 0".to_string());
    }
    if settings.remote.timeout_ms == 0 {
        errors.push("settings.remote.timeout_ms must be > 0".to_string());
    }
}

fn validate_callee(callee: &CalleeConfig, errors: &mut Vec<String>) {
    if callee.api.trim().is_empty() {
        errors.push("callee.api (CalleeApi) is required".to_string());
    } else {
        validate_http_url("callee.api", &callee.api, errors);
    }
    if callee.default_scope().is_none() {
        errors.push(
            "callee.default_scope (DefaultScope) or callee.app_registration_id (CalleeAppRegistrationId) is required"
                .to_string(),
        );
    }
}

fn validate_identity(identity: &IdentityConfig, errors: &mut Vec<String>) {
    if identity.development_chain.is_empty() {
        errors.push("identity.development_chain must list at least one credential".to_string());
    }
    let mut seen = HashSet::new();
    for kind in &identity.development_chain {
        if !seen.insert(kind) {
            errors.push(format!(
                "identity.development_chain lists {:?} more than once",
                kind
            ));
        }
    }
    if identity.cli_program.trim().is_empty() {
        errors.push("identity.cli_program must not be empty".to_string());
    }

    let managed = &identity.managed_identity;
    match (&managed.identity_endpoint, &managed.identity_header) {
        (Some(endpoint), Some(_)) => {
            validate_http_url("identity.managed_identity.identity_endpoint", endpoint, errors)
        }
        (None, None) => {}
        _ => errors.push(
            "identity.managed_identity.identity_endpoint and identity_header must be set together"
                .to_string(),
        ),
    }
    validate_http_url("identity.managed_identity.imds_endpoint", &managed.imds_endpoint, errors);
    validate_http_url("identity.authority_host", &identity.authority_host, errors);
}

fn validate_http_url(field: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!(
            "{} '{}' must use http or https, got '{}'",
            field,
            value,
            url.scheme()
        )),
        Err(e) => errors.push(format!("{} '{}' is not a valid url: {}", field, value, e)),
    }
}
