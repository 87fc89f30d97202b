use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{info, warn};

use crate::cache::token_broker::TokenBroker;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::remote::caller::AuthenticatedCaller;
use crate::server::{callee_routes, relay_routes};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TokenBroker>,
    pub caller: Arc<AuthenticatedCaller>,
    pub metrics_state: MetricsState,
}

impl AppState {
    pub async fn new(broker: Arc<TokenBroker>, caller: Arc<AuthenticatedCaller>) -> Self {
        let metrics = get_metrics().await;
        Self {
            broker,
            caller,
            metrics_state: MetricsState::new(metrics.registry.clone()),
        }
    }
}

/// Relay routes plus the metrics route when enabled.
pub fn relay_app(state: AppState, settings_config: &SettingsConfig) -> Router {
    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(relay_routes::router())
        .with_state(state)
}

pub async fn callee_app(
    state: callee_routes::CalleeState,
    settings_config: &SettingsConfig,
) -> Router {
    let metrics = get_metrics().await;
    Router::new()
        .merge(MetricsState::new(metrics.registry.clone()).router(&settings_config.metrics))
        .merge(callee_routes::router())
        .with_state(state)
}

/// Bind the configured address and serve `app` until ctrl-c.
pub async fn start(settings_config: &SettingsConfig, app: Router) -> Result<()> {
    let metrics = get_metrics().await;
    let bind_addr = format!(
        "{}:{}",
        settings_config.server.host, settings_config.server.port
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!(address = %bind_addr, "listening");

    metrics.up.set(1);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed");
    metrics.up.set(0);
    served
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "cannot listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await
        }
    }
}
