use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::token::redact;
use crate::cache::token_broker::TokenBroker;
use crate::config::settings::RemoteCallConfig;
use crate::credentials::response::truncate_body;
use crate::errors::{RelayError, RelayResult};
use crate::helpers::time::get_instant;
use crate::observability::metrics::{get_metrics, MODE_BROKERED, MODE_PASS_THROUGH};

/// One outbound call: where it goes and which bearer it carries.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceCallContext {
    pub target_uri: Url,
    pub bearer_token: String,
    /// Set when the token came from the broker.
    pub scope: Option<String>,
}

impl std::fmt::Debug for ServiceCallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCallContext")
            .field("target_uri", &self.target_uri.as_str())
            .field("bearer_token", &redact(&self.bearer_token))
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResult {
    pub data: Value,
    pub request_uri: String,
    /// Token actually sent, whether supplied or acquired.
    pub token: String,
}

/// Calls the callee API with a bearer token, either supplied by the inbound
/// caller or acquired from the broker.
pub struct AuthenticatedCaller {
    client: Client,
    broker: Arc<TokenBroker>,
    base_uri: Url,
}

impl AuthenticatedCaller {
    pub fn new(broker: Arc<TokenBroker>, api: &str, config: &RemoteCallConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::with_client(broker, parse_base_uri(api)?, client))
    }

    pub fn with_client(broker: Arc<TokenBroker>, base_uri: Url, client: Client) -> Self {
        Self {
            client,
            broker,
            base_uri,
        }
    }

    /// GET `path` relative to the callee base uri.
    ///
    /// A non-blank `token` is sent verbatim and the broker is not touched.
    /// Otherwise a token is acquired for `scope` or the default scope.
    pub async fn call(
        &self,
        path: &str,
        token: Option<&str>,
        scope: Option<&str>,
    ) -> RelayResult<RemoteResult> {
        let context = self.context(path, token, scope).await?;
        self.send(path, context).await
    }

    async fn context(
        &self,
        path: &str,
        token: Option<&str>,
        scope: Option<&str>,
    ) -> RelayResult<ServiceCallContext> {
        let target_uri = self
            .base_uri
            .join(path.trim_start_matches('/'))
            .map_err(|e| RelayError::RemoteCall(format!("invalid remote path '{}': {}", path, e)))?;

        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(supplied) => Ok(ServiceCallContext {
                target_uri,
                bearer_token: supplied.to_owned(),
                scope: None,
            }),
            None => {
                let scope = self.broker.scope_or_default(scope)?;
                let acquired = self.broker.acquire(&scope).await?;
                Ok(ServiceCallContext {
                    target_uri,
                    bearer_token: acquired.value,
                    scope: Some(scope),
                })
            }
        }
    }

    async fn send(&self, path: &str, context: ServiceCallContext) -> RelayResult<RemoteResult> {
        let metrics = get_metrics().await;
        let start = get_instant();
        let mode = if context.scope.is_some() {
            MODE_BROKERED
        } else {
            MODE_PASS_THROUGH
        };
        metrics.remote_calls.with_label_values(&[path, mode]).inc();
        debug!(context = ?context, mode, "calling remote service");

        let result = self.fetch(&context).await;
        metrics
            .remote_call_duration
            .with_label_values(&[path])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(data) => {
                info!(uri = %context.target_uri, mode, "remote call succeeded");
                Ok(RemoteResult {
                    data,
                    request_uri: context.target_uri.to_string(),
                    token: context.bearer_token,
                })
            }
            Err(e) => {
                warn!(uri = %context.target_uri, mode, error = %e, "remote call failed");
                metrics.remote_call_failures.with_label_values(&[path]).inc();
                Err(e)
            }
        }
    }

    async fn fetch(&self, context: &ServiceCallContext) -> RelayResult<Value> {
        let response = self
            .client
            .get(context.target_uri.clone())
            .bearer_auth(&context.bearer_token)
            .header(ACCEPT, "application/json, text/plain")
            .send()
            .await
            .map_err(|e| RelayError::RemoteCall(format!("request to {} failed: {}", context.target_uri, e)))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::RemoteCall(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(RelayError::RemoteCall(format!(
                "{} answered {}: {}",
                context.target_uri,
                status,
                truncate_body(&body)
            )));
        }

        parse_body(&context.target_uri, is_json, body)
    }
}

/// JSON bodies are relayed as values whatever the content type says; other
/// bodies become a JSON string unless the callee declared JSON.
fn parse_body(uri: &Url, declared_json: bool, body: String) -> RelayResult<Value> {
    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(e) if declared_json => Err(RelayError::RemoteCall(format!(
            "malformed json from {}: {}",
            uri, e
        ))),
        Err(_) => Ok(Value::String(body)),
    }
}

/// Base uri with a trailing slash so relative paths append instead of replace.
pub fn parse_base_uri(api: &str) -> anyhow::Result<Url> {
    let api = api.trim();
    let normalized = if api.ends_with('/') {
        api.to_owned()
    } else {
        format!("{}/", api)
    };
    let url = Url::parse(&normalized)?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("callee api must be http or https, got '{}'", url.scheme());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;
    use crate::tests::common::{broker_with, build_reqwest_client, json, FakeCredential, TEST_DEFAULT_SCOPE};

    fn caller(server: &MockServer, fake: &FakeCredential) -> AuthenticatedCaller {
        AuthenticatedCaller::with_client(
            Arc::new(broker_with(fake.clone())),
            parse_base_uri(&server.base_url()).unwrap(),
            build_reqwest_client(),
        )
    }

    #[test]
    fn base_uri_gets_trailing_slash() {
        assert_eq!(
            parse_base_uri("https://callee.example/api").unwrap().join("ping").unwrap().as_str(),
            "https://callee.example/api/ping"
        );
        assert!(parse_base_uri("ftp://callee").is_err());
        assert!(parse_base_uri("not a uri").is_err());
    }

    #[tokio::test]
    async fn supplied_token_is_sent_verbatim_without_acquisition() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/ping")
                    .header("authorization", "Bearer caller-supplied");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#""pong! 2024-01-01T00:00:00Z""#);
            })
            .await;
        let fake = FakeCredential::issuing(3600);

        let result = caller(&server, &fake)
            .call("ping", Some("caller-supplied"), Some("ignored-scope"))
            .await
            .unwrap();

        assert_eq!(result.data, json!("pong! 2024-01-01T00:00:00Z"));
        assert_eq!(result.token, "caller-supplied");
        assert_eq!(result.request_uri, server.url("/ping"));
        assert_eq!(fake.calls(), 0);
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn missing_token_is_acquired_for_default_scope() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/weatherforecast")
                    .header("authorization", "Bearer token-1");
                then.status(200).json_body(json!([{"summary": "Mild"}]));
            })
            .await;
        let fake = FakeCredential::issuing(3600);
        let caller = caller(&server, &fake);

        let first = caller.call("/weatherforecast", None, None).await.unwrap();
        let second = caller.call("/weatherforecast", Some("  "), None).await.unwrap();

        assert_eq!(first.data, json!([{"summary": "Mild"}]));
        assert_eq!(first.token, "token-1");
        assert_eq!(second.token, "token-1");
        assert_eq!(fake.calls(), 1);
        assert_eq!(fake.scopes(), vec![TEST_DEFAULT_SCOPE.to_owned()]);
        mock.assert_calls_async(2).await;
    }

    #[tokio::test]
    async fn scope_override_is_used_for_acquisition() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).body("pong");
            })
            .await;
        let fake = FakeCredential::issuing(3600);

        let result = caller(&server, &fake)
            .call("ping", None, Some("api://other/.default"))
            .await
            .unwrap();

        assert_eq!(result.data, json!("pong"));
        assert_eq!(fake.scopes(), vec!["api://other/.default".to_owned()]);
    }

    #[test]
    fn json_body_is_parsed_without_content_type() {
        let uri = Url::parse("http://callee/weatherforecast").unwrap();
        assert_eq!(
            parse_body(&uri, false, r#"[{"summary":"Mild"}]"#.to_owned()).unwrap(),
            json!([{"summary": "Mild"}])
        );
        assert_eq!(parse_body(&uri, false, "pong".to_owned()).unwrap(), json!("pong"));
        assert_eq!(parse_body(&uri, true, "pong".to_owned()).unwrap_err().kind(), "remote_call");
    }

    #[tokio::test]
    async fn json_array_without_content_type_is_not_double_encoded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/weatherforecast");
                then.status(200).body(r#"[{"summary":"Mild"}]"#);
            })
            .await;

        let result = caller(&server, &FakeCredential::issuing(3600))
            .call("weatherforecast", Some("t"), None)
            .await
            .unwrap();
        assert_eq!(result.data, json!([{"summary": "Mild"}]));
    }

    #[tokio::test]
    async fn non_success_status_is_remote_call_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(401).body("invalid audience");
            })
            .await;

        let err = caller(&server, &FakeCredential::issuing(3600))
            .call("ping", Some("t"), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "remote_call");
        assert!(err.to_string().contains("401"), "{}", err);
        assert!(err.to_string().contains("invalid audience"), "{}", err);
    }

    #[tokio::test]
    async fn malformed_json_is_remote_call_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("{not json");
            })
            .await;

        let err = caller(&server, &FakeCredential::issuing(3600))
            .call("ping", Some("t"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "remote_call");
    }

    #[tokio::test]
    async fn acquisition_failure_skips_remote_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping");
                then.status(200).body("pong");
            })
            .await;

        let err = caller(&server, &FakeCredential::failing("no identity"))
            .call("ping", None, None)
            .await
            .unwrap_err();

        assert_eq!(err, RelayError::TokenAcquisition("no identity".to_owned()));
        mock.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn unreachable_remote_is_remote_call_error() {
        let broker = Arc::new(broker_with(FakeCredential::issuing(3600)));
        let caller = AuthenticatedCaller::with_client(
            broker,
            parse_base_uri("http://127.0.0.1:9").unwrap(),
            build_reqwest_client(),
        );

        let err = caller.call("ping", Some("t"), None).await.unwrap_err();
        assert_eq!(err.kind(), "remote_call");
    }
}
