use serde::Deserialize;

use crate::config::identity::IdentityConfig;
use crate::config::settings::SettingsConfig;

/// ================================
/// Full relay configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub callee: CalleeConfig,
}

/// ================================
/// Downstream API the relay calls
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CalleeConfig {
    /// `CalleeAppRegistrationId`: scope requested when none is given explicitly.
    pub app_registration_id: Option<String>,
    /// `CalleeApi`: base URI of the callee.
    #[serde(default)]
    pub api: String,
    /// `DefaultScope`: takes precedence over `app_registration_id`.
    pub default_scope: Option<String>,
}

impl CalleeConfig {
    /// Scope used when a request carries none.
    pub fn default_scope(&self) -> Option<String> {
        non_blank(&self.default_scope).or_else(|| non_blank(&self.app_registration_id))
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// ================================
/// Callee service configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CalleeServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    /// When set, bearer tokens must carry this `aud`.
    pub expected_audience: Option<String>,
}
