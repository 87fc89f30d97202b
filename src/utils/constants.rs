//! Shared constants and invariants

pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 30;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const IMDS_API_VERSION: &str = "2018-02-01";
pub const APP_SERVICE_API_VERSION: &str = "2019-08-01";
pub const DEFAULT_CLI_PROGRAM: &str = "az";

pub const SCOPE_DEFAULT_SUFFIX: &str = "/.default";

// Remote (callee) paths
pub const REMOTE_PING_PATH: &str = "ping";
pub const REMOTE_FORECAST_PATH: &str = "weatherforecast";
