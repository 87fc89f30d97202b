use anyhow::Result;
use clap::Parser;
use token_relay::server::callee_routes::CalleeState;
use token_relay::server::server;
use token_relay::utils::config_loader;
use token_relay::utils::logging::{self, LogLevel};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Downstream API protected by bearer tokens", long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-relay-callee.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// Overrides `expected_audience` from the config file.
    #[arg(long, env = "EXPECTED_AUDIENCE")]
    expected_audience: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config_loader::run_callee(&args.config).await?;
    logging::run(config.settings.logging.as_ref(), args.log_level);

    let state = CalleeState {
        expected_audience: args.expected_audience.or(config.expected_audience),
    };
    info!(expected_audience = ?state.expected_audience, "callee starting...");

    let app = server::callee_app(state, &config.settings).await;
    server::start(&config.settings, app).await
}
