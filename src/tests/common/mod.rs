// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;

use crate::cache::token::AccessToken;
use crate::cache::token_broker::{BrokerSettings, TokenBroker};
use crate::credentials::GetToken;
use crate::errors::{RelayError, RelayResult};
use crate::helpers::time::now_u64;

pub const TEST_DEFAULT_SCOPE: &str = "api://default/.default";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Unsigned three-segment token with the given claims.
pub fn make_jwt(claims: Value) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT", "kid": "test-key"});
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("not-a-signature"),
    )
}

/// Broker with no safety margin and [`TEST_DEFAULT_SCOPE`] as default.
pub fn broker_with(credential: FakeCredential) -> TokenBroker {
    TokenBroker::new(
        Arc::new(credential),
        BrokerSettings {
            acquire_timeout: Duration::from_secs(5),
            safety_margin_seconds: 0,
            default_scope: Some(TEST_DEFAULT_SCOPE.to_owned()),
        },
    )
}

/// Identity provider stand-in that counts exchanges.
///
/// Issues `token-<n>` (or an unsigned JWT) valid for `ttl_seconds`, or fails
/// every time with a fixed message.
#[derive(Clone)]
pub struct FakeCredential {
    pub calls: Arc<AtomicUsize>,
    scopes: Arc<Mutex<Vec<String>>>,
    ttl_seconds: u64,
    failure: Option<String>,
    delay: Duration,
    slow_scope: Option<(String, Duration)>,
    jwt_values: bool,
}

impl FakeCredential {
    pub fn issuing(ttl_seconds: u64) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            scopes: Arc::new(Mutex::new(Vec::new())),
            ttl_seconds,
            failure: None,
            delay: Duration::ZERO,
            slow_scope: None,
            jwt_values: false,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_owned()),
            ..Self::issuing(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_slow_scope(mut self, scope: &str, delay: Duration) -> Self {
        self.slow_scope = Some((scope.to_owned(), delay));
        self
    }

    pub fn with_jwt_values(mut self) -> Self {
        self.jwt_values = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scopes.lock().unwrap().clone()
    }
}

impl GetToken for FakeCredential {
    fn get_token<'a>(&'a self, scope: &'a str) -> BoxFuture<'a, RelayResult<AccessToken>> {
        async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.scopes.lock().unwrap().push(scope.to_owned());

            let delay = match &self.slow_scope {
                Some((slow, d)) if slow == scope => *d,
                _ => self.delay,
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Some(message) = &self.failure {
                return Err(RelayError::TokenAcquisition(message.clone()));
            }
            let expires_at = now_u64() + self.ttl_seconds;
            let value = if self.jwt_values {
                make_jwt(json!({
                    "iss": "https://sts.windows.net/tenant-1/",
                    "aud": scope.trim_end_matches("/.default"),
                    "exp": expires_at,
                    "appid": "relay-app",
                    "n": n
                }))
            } else {
                format!("token-{}", n)
            };
            Ok(AccessToken::new(value, expires_at))
        }
        .boxed()
    }
}
