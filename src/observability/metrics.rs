use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

// acquisition outcome labels
pub const OUTCOME_CACHE: &str = "cache";
pub const OUTCOME_UPSTREAM: &str = "upstream";
pub const OUTCOME_JOINED: &str = "joined";

// remote call mode labels
pub const MODE_PASS_THROUGH: &str = "pass_through";
pub const MODE_BROKERED: &str = "brokered";

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Broker metrics. Scopes come from requests, so they are never labels.
    pub token_acquisitions: IntCounterVec,
    pub token_acquisition_failures: IntCounterVec,
    pub token_exchange_duration: Histogram,
    pub cached_scopes: IntGauge,

    // Remote call metrics
    pub remote_calls: IntCounterVec,
    pub remote_call_failures: IntCounterVec,
    pub remote_call_duration: HistogramVec,

    // Inbound
    pub http_requests: IntCounterVec,

    // Config/runtime
    pub config_parse_failures: IntCounter,
    pub config_validation_errors: IntCounter,
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenrelay".into()), None)
            .expect("metrics registry prefix is valid");

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Broker
            token_acquisitions: IntCounterVec::new(Opts::new("token_acquisitions_total", "Token acquisitions by outcome"), &["outcome"]).expect("metric"),
            token_acquisition_failures: IntCounterVec::new(Opts::new("token_acquisition_failures_total", "Failed token exchanges by reason"), &["reason"]).expect("metric"),
            token_exchange_duration: Histogram::with_opts(HistogramOpts::new("token_exchange_duration_seconds", "Identity provider exchange duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])).expect("metric"),
            cached_scopes: IntGauge::new("cached_scopes", "Scopes holding a cached token").expect("metric"),

            // Remote
            remote_calls: IntCounterVec::new(Opts::new("remote_calls_total", "Outbound calls by path and token mode"), &["path", "mode"]).expect("metric"),
            remote_call_failures: IntCounterVec::new(Opts::new("remote_call_failures_total", "Outbound call failures by path"), &["path"]).expect("metric"),
            remote_call_duration: HistogramVec::new(HistogramOpts::new("remote_call_duration_seconds", "Outbound call duration seconds").buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]), &["path"]).expect("metric"),

            http_requests: IntCounterVec::new(Opts::new("http_requests_total", "Inbound requests by route and status"), &["route", "status"]).expect("metric"),

            // Config/runtime
            config_parse_failures: IntCounter::new("config_parse_failures_total", "Config files that failed to parse").expect("metric"),
            config_validation_errors: IntCounter::new("config_validation_errors_total", "Validation errors during startup").expect("metric"),
            up: IntGauge::new("up", "1 if service is healthy").expect("metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_acquisitions.clone())).expect("register");
        reg.register(Box::new(metrics.token_acquisition_failures.clone())).expect("register");
        reg.register(Box::new(metrics.token_exchange_duration.clone())).expect("register");
        reg.register(Box::new(metrics.cached_scopes.clone())).expect("register");
        reg.register(Box::new(metrics.remote_calls.clone())).expect("register");
        reg.register(Box::new(metrics.remote_call_failures.clone())).expect("register");
        reg.register(Box::new(metrics.remote_call_duration.clone())).expect("register");
        reg.register(Box::new(metrics.http_requests.clone())).expect("register");
        reg.register(Box::new(metrics.config_parse_failures.clone())).expect("register");
        reg.register(Box::new(metrics.config_validation_errors.clone())).expect("register");
        reg.register(Box::new(metrics.up.clone())).expect("register");

        metrics
    }
}
