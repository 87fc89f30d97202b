use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use reqwest::Client;
use token_relay::cache::token_broker::{BrokerSettings, TokenBroker};
use token_relay::config::identity::RuntimeMode;
use token_relay::credentials::resolver::CredentialResolver;
use token_relay::remote::caller::AuthenticatedCaller;
use token_relay::server::server::{self, AppState};
use token_relay::utils::config_loader;
use token_relay::utils::logging::{self, LogLevel};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-relay.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// Overrides `identity.runtime_mode` from the config file.
    #[arg(long, env = "RUNTIME_MODE", value_enum)]
    runtime_mode: Option<RuntimeMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(service_config.settings.logging.as_ref(), args.log_level);

    let runtime_mode = args.runtime_mode.unwrap_or(service_config.identity.runtime_mode);

    // -------------------------------
    // 2. Resolve the process credential
    // -------------------------------

    let client = Client::builder()
        .timeout(std::time::Duration::from_millis(
            service_config.settings.broker.acquire_timeout_ms,
        ))
        .build()?;
    let credential = CredentialResolver::new(client).resolve(runtime_mode, &service_config.identity);

    // -------------------------------
    // 3. Broker and outbound caller
    // -------------------------------

    let broker = Arc::new(TokenBroker::new(
        Arc::new(credential),
        BrokerSettings::new(&service_config.settings.broker, service_config.callee.default_scope()),
    ));
    let caller = Arc::new(
        AuthenticatedCaller::new(
            Arc::clone(&broker),
            &service_config.callee.api,
            &service_config.settings.remote,
        )
        .map_err(|e| anyhow!("invalid callee api '{}': {}", service_config.callee.api, e))?,
    );

    // -------------------------------
    // 4. Start http server
    // -------------------------------

    let state = AppState::new(broker, caller).await;
    let app = server::relay_app(state, &service_config.settings);

    info!(mode = ?runtime_mode, callee = %service_config.callee.api, "relay starting...");
    server::start(&service_config.settings, app).await
}
