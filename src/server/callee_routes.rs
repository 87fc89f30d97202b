use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Days, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::errors::{RelayError, RelayResult};
use crate::helpers::time::now_u64;
use crate::observability::metrics::get_metrics;
use crate::parser::token_inspector::{decode, DecodedToken};

pub const ROUTE_PING: &str = "/ping";
pub const ROUTE_FORECAST: &str = "/weatherforecast";

const SUMMARIES: [&str; 10] = [
    "Freezing", "Bracing", "Chilly", "Cool", "Mild", "Warm", "Balmy", "Hot", "Sweltering", "Scorching",
];
const FORECAST_DAYS: u64 = 5;

#[derive(Debug, Clone, Default)]
pub struct CalleeState {
    /// When set, bearer tokens must list this audience.
    pub expected_audience: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    pub date: String,
    pub temperature_c: i32,
    pub temperature_f: i32,
    pub summary: String,
}

pub fn router() -> Router<CalleeState> {
    info!("served paths: {}, {}", ROUTE_PING, ROUTE_FORECAST);
    Router::new()
        .route(ROUTE_PING, get(ping))
        .route(ROUTE_FORECAST, get(forecast))
}

/// No authentication.
async fn ping() -> Json<String> {
    record(ROUTE_PING, StatusCode::OK).await;
    Json(format!(
        "pong! {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
    ))
}

async fn forecast(State(state): State<CalleeState>, headers: HeaderMap) -> Response {
    match authorize(&headers, state.expected_audience.as_deref()) {
        Ok(token) => {
            debug!(iss = ?token.issuer(), aud = ?token.audiences(), "bearer accepted");
            record(ROUTE_FORECAST, StatusCode::OK).await;
            Json(weather_forecast(now_u64())).into_response()
        }
        Err(e) => {
            info!(error = %e, "bearer rejected");
            record(ROUTE_FORECAST, StatusCode::UNAUTHORIZED).await;
            (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Bearer must decode, be unexpired and, when configured, carry the audience.
/// The signature is not verified.
pub fn authorize(headers: &HeaderMap, expected_audience: Option<&str>) -> RelayResult<DecodedToken> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, credentials)| credentials.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest("missing bearer token".to_owned()))?;

    let token = decode(bearer)?;

    match token.expires_at() {
        Some(exp) if exp > now_u64() => {}
        Some(exp) => {
            return Err(RelayError::InvalidRequest(format!("token expired at {}", exp)));
        }
        None => return Err(RelayError::InvalidRequest("token has no exp claim".to_owned())),
    }

    if let Some(expected) = expected_audience.map(str::trim).filter(|a| !a.is_empty()) {
        if !token.audiences().contains(&expected) {
            return Err(RelayError::InvalidRequest(format!(
                "token audience {:?} does not include '{}'",
                token.audiences(),
                expected
            )));
        }
    }

    Ok(token)
}

/// Five days starting tomorrow; values derived from `seed`.
pub fn weather_forecast(seed: u64) -> Vec<WeatherForecast> {
    let today = Utc::now().date_naive();
    (1..=FORECAST_DAYS)
        .map(|day| {
            let mix = seed.wrapping_add(day.wrapping_mul(7919));
            let temperature_c = (mix % 75) as i32 - 20;
            WeatherForecast {
                date: today
                    .checked_add_days(Days::new(day))
                    .unwrap_or(today)
                    .format("%Y-%m-%d")
                    .to_string(),
                temperature_c,
                temperature_f: 32 + (temperature_c as f64 / 0.5556) as i32,
                summary: SUMMARIES[(mix % SUMMARIES.len() as u64) as usize].to_owned(),
            }
        })
        .collect()
}

async fn record(route: &str, status: StatusCode) {
    get_metrics()
        .await
        .http_requests
        .with_label_values(&[route, status.as_str()])
        .inc();
}
