use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::errors::{RelayError, RelayResult};
use crate::observability::metrics::get_metrics;
use crate::parser::token_inspector::inspect;
use crate::remote::caller::RemoteResult;
use crate::server::envelope::{Envelope, Reply};
use crate::server::server::AppState;
use crate::utils::constants::{REMOTE_FORECAST_PATH, REMOTE_PING_PATH};

pub const ROUTE_TOKEN: &str = "/token";
pub const ROUTE_ACCESS_TOKEN: &str = "/access-token";
pub const ROUTE_REMOTE_PING: &str = "/remote-ping";
pub const ROUTE_FORECAST: &str = "/weatherforecast";
pub const ROUTE_FORECAST_WITH_TOKEN: &str = "/weatherforcast-with-token";

#[derive(Debug, Default, Deserialize)]
pub struct RelayQuery {
    pub token: Option<String>,
    pub scope: Option<String>,
}

pub fn router() -> Router<AppState> {
    for route in [
        ROUTE_TOKEN,
        ROUTE_ACCESS_TOKEN,
        ROUTE_REMOTE_PING,
        ROUTE_FORECAST,
        ROUTE_FORECAST_WITH_TOKEN,
    ] {
        info!("served path: {}", route);
    }
    Router::new()
        .route(ROUTE_TOKEN, get(token))
        .route(ROUTE_ACCESS_TOKEN, get(access_token))
        .route(ROUTE_REMOTE_PING, get(remote_ping))
        .route(ROUTE_FORECAST, get(forecast))
        .route(ROUTE_FORECAST_WITH_TOKEN, get(forecast_with_token))
}

type RelayQueryResult = Result<Query<RelayQuery>, QueryRejection>;

async fn token(State(state): State<AppState>, query: RelayQueryResult) -> Reply {
    let result = async {
        let query = relay_query(query)?;
        let token = acquire(&state, query.scope.as_deref()).await?;
        Ok::<_, RelayError>(Envelope {
            token: Some(token),
            ..Envelope::default()
        })
    };
    respond(ROUTE_TOKEN, "Fail to get token", result.await).await
}

async fn access_token(State(state): State<AppState>, query: RelayQueryResult) -> Reply {
    let result = async {
        let query = relay_query(query)?;
        let token = acquire(&state, query.scope.as_deref()).await?;
        Ok::<_, RelayError>(Envelope {
            jwt: inspect(Some(&token)),
            token: Some(token),
            ..Envelope::default()
        })
    };
    respond(ROUTE_ACCESS_TOKEN, "Fail to get access token", result.await).await
}

async fn remote_ping(State(state): State<AppState>, query: RelayQueryResult) -> Reply {
    let result = async {
        let query = relay_query(query)?;
        let remote = state
            .caller
            .call(REMOTE_PING_PATH, query.token.as_deref(), query.scope.as_deref())
            .await?;
        Ok::<_, RelayError>(Envelope {
            data: Some(remote.data),
            request_uri: Some(remote.request_uri),
            token: Some(remote.token),
            ..Envelope::default()
        })
    };
    respond(ROUTE_REMOTE_PING, "Fetching pinging Callee", result.await).await
}

async fn forecast(State(state): State<AppState>, query: RelayQueryResult) -> Reply {
    let result = async {
        let query = relay_query(query)?;
        let remote = state
            .caller
            .call(REMOTE_FORECAST_PATH, None, query.scope.as_deref())
            .await?;
        Ok::<_, RelayError>(with_claims(remote))
    };
    respond(ROUTE_FORECAST, "Fail to get weather forecast", result.await).await
}

/// Pass-through only: the inbound caller must bring the token.
async fn forecast_with_token(State(state): State<AppState>, query: RelayQueryResult) -> Reply {
    let result = async {
        let query = relay_query(query)?;
        let token = query
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::InvalidRequest("query parameter 'token' is required".to_owned()))?;
        let remote = state.caller.call(REMOTE_FORECAST_PATH, Some(token), None).await?;
        Ok::<_, RelayError>(with_claims(remote))
    };
    respond(ROUTE_FORECAST_WITH_TOKEN, "Fail to get weather forecast", result.await).await
}

/// Malformed query strings are answered with the envelope, not axum's plain text.
fn relay_query(query: RelayQueryResult) -> RelayResult<RelayQuery> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| RelayError::InvalidRequest(rejection.body_text()))
}

async fn acquire(state: &AppState, scope: Option<&str>) -> RelayResult<String> {
    let scope = state.broker.scope_or_default(scope)?;
    Ok(state.broker.acquire(&scope).await?.value)
}

fn with_claims(remote: RemoteResult) -> Envelope {
    Envelope {
        jwt: inspect(Some(&remote.token)),
        data: Some(remote.data),
        request_uri: Some(remote.request_uri),
        token: Some(remote.token),
        ex: None,
    }
}

async fn respond(route: &str, title: &str, result: RelayResult<Envelope>) -> Reply {
    let reply = match result {
        Ok(envelope) => Reply::ok(envelope),
        Err(e) => {
            info!(route, error = %e, kind = e.kind(), "request failed");
            Reply::failed(title, &e)
        }
    };
    get_metrics()
        .await
        .http_requests
        .with_label_values(&[route, reply.status.as_str()])
        .inc();
    reply
}
