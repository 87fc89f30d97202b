//! Per-scope token cache with single-flight acquisition.
//!
//! Each scope owns one [`CacheEntry`]. A miss spawns the exchange as its own
//! task and parks a shared handle in the entry, so every concurrent caller for
//! that scope awaits the same result and the exchange survives callers that
//! go away. The map lock is only held to look up or update an entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::token::AccessToken;
use crate::config::settings::BrokerConfig;
use crate::credentials::GetToken;
use crate::errors::{RelayError, RelayResult};
use crate::helpers::time::{get_instant, now_u64};
use crate::observability::metrics::{get_metrics, OUTCOME_CACHE, OUTCOME_JOINED, OUTCOME_UPSTREAM};

type SharedAcquisition = Shared<BoxFuture<'static, RelayResult<AccessToken>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub scope: String,
    pub requested_at: u64, // UNIX TIMESTAMP
}

impl TokenRequest {
    pub fn new(scope: &str) -> RelayResult<Self> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(RelayError::TokenAcquisition("scope must not be empty".to_owned()));
        }
        Ok(Self {
            scope: scope.to_owned(),
            requested_at: now_u64(),
        })
    }
}

#[derive(Default)]
struct CacheEntry {
    token: Option<AccessToken>,
    in_flight: Option<SharedAcquisition>,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub acquire_timeout: Duration,
    pub safety_margin_seconds: u64,
    /// Scope used when a caller does not name one.
    pub default_scope: Option<String>,
}

impl BrokerSettings {
    pub fn new(config: &BrokerConfig, default_scope: Option<String>) -> Self {
        Self {
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            safety_margin_seconds: config.safety_margin_seconds,
            default_scope,
        }
    }
}

pub struct TokenBroker {
    credential: Arc<dyn GetToken>,
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    settings: BrokerSettings,
}

impl TokenBroker {
    pub fn new(credential: Arc<dyn GetToken>, settings: BrokerSettings) -> Self {
        Self {
            credential,
            entries: Arc::new(Mutex::new(HashMap::new())),
            settings,
        }
    }

    /// Explicit, non-blank scope or the configured default.
    pub fn scope_or_default(&self, explicit: Option<&str>) -> RelayResult<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .or_else(|| self.settings.default_scope.clone())
            .ok_or_else(|| {
                RelayError::TokenAcquisition("no scope requested and no default scope configured".to_owned())
            })
    }

    /// Live cached token for `scope`, or the result of the (possibly shared)
    /// exchange with the identity provider.
    pub async fn acquire(&self, scope: &str) -> RelayResult<AccessToken> {
        let request = TokenRequest::new(scope)?;
        let metrics = get_metrics().await;

        let acquisition = {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(request.scope.clone()).or_default();

            if let Some(token) = entry
                .token
                .as_ref()
                .filter(|t| !t.is_expired(self.settings.safety_margin_seconds))
            {
                debug!(scope = %request.scope, token = %token.redacted(), "token served from cache");
                metrics
                    .token_acquisitions
                    .with_label_values(&[OUTCOME_CACHE])
                    .inc();
                return Ok(token.clone());
            }

            match &entry.in_flight {
                Some(in_flight) => {
                    debug!(scope = %request.scope, "joining in-flight acquisition");
                    metrics
                        .token_acquisitions
                        .with_label_values(&[OUTCOME_JOINED])
                        .inc();
                    in_flight.clone()
                }
                None => {
                    metrics
                        .token_acquisitions
                        .with_label_values(&[OUTCOME_UPSTREAM])
                        .inc();
                    let acquisition = self.spawn_acquisition(request.clone());
                    entry.in_flight = Some(acquisition.clone());
                    acquisition
                }
            }
        };

        acquisition.await
    }

    fn spawn_acquisition(&self, request: TokenRequest) -> SharedAcquisition {
        let credential = Arc::clone(&self.credential);
        let entries = Arc::clone(&self.entries);
        let deadline = self.settings.acquire_timeout;

        info!(scope = %request.scope, requested_at = request.requested_at, "acquiring token from identity provider");

        let handle = tokio::spawn(async move {
            let metrics = get_metrics().await;
            let start = get_instant();
            let scope = request.scope;

            let result = match timeout(deadline, credential.get_token(&scope)).await {
                Ok(result) => result,
                Err(_) => Err(RelayError::TokenAcquisition(format!(
                    "identity provider did not answer within {} ms",
                    deadline.as_millis()
                ))),
            };
            metrics
                .token_exchange_duration
                .observe(start.elapsed().as_secs_f64());

            let mut entries = entries.lock().await;
            match &result {
                Ok(token) => {
                    info!(scope = %scope, token = %token.redacted(), expires_at = token.expires_at, "token acquired");
                    let entry = entries.entry(scope.clone()).or_default();
                    entry.in_flight = None;
                    entry.token = Some(token.clone());
                }
                Err(e) => {
                    warn!(scope = %scope, error = %e, "token acquisition failed");
                    metrics
                        .token_acquisition_failures
                        .with_label_values(&[e.kind()])
                        .inc();
                    // a failed scope holds nothing worth keeping
                    entries.remove(&scope);
                }
            }
            metrics
                .cached_scopes
                .set(entries.values().filter(|e| e.token.is_some()).count() as i64);

            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(RelayError::TokenAcquisition(format!(
                    "acquisition task ended unexpectedly: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared()
    }
}
