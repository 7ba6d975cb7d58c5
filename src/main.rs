//! Watchtower Inventory RFID Ingestion Worker
//!
//! Streams tag sightings from Redpanda and accounts for them:
//! - One subscription per process over every partition of the topic,
//!   each partition read in order
//! - Per-message decode on tracked tasks, drained on shutdown
//! - Health probes and a Prometheus scrape endpoint over HTTP

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use api::{router, AppState};
use redpanda::{RedpandaConfig, RedpandaSubscriber, Subscriber};
use telemetry::{init_tracing_from_env, HealthRegistry, Metrics};
use worker::{IngestionWorker, WorkerConfig, WorkerController, WorkerReport};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Service name reported by the health endpoint
    #[serde(default = "default_service_name")]
    service_name: String,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    worker: WorkerConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_service_name() -> String {
    "Watchtower Inventory".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            service_name: default_service_name(),
            redpanda: RedpandaConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    // rustls 0.23+ requires explicit crypto provider selection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting RFID ingestion worker v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = ?config.redpanda.brokers,
        topic = %config.redpanda.consumer.topic,
        group_id = %config.redpanda.consumer.group_id,
        sasl_username = config.redpanda.sasl_username.as_deref().unwrap_or("none"),
        "Loaded Redpanda config"
    );

    let metrics = Arc::new(Metrics::new().context("Failed to create metrics registry")?);
    let health = Arc::new(HealthRegistry::new());

    check_health(&config, &health).await;

    let subscriber = Arc::new(RedpandaSubscriber::new(config.redpanda.clone()));
    let report = run(&config, subscriber, metrics.clone(), health, shutdown_signal()).await?;

    info!(
        reason = ?report.reason,
        messages_read = report.messages_read,
        events_processed = metrics.events_processed.get(),
        decode_failures = metrics.decode_failures.get(),
        tasks_abandoned = report.tasks_abandoned,
        "Shutdown complete"
    );

    Ok(())
}

/// Binds the HTTP listener, starts the worker and serves until `shutdown`.
///
/// The listener is bound before the worker subscribes, so once the worker
/// is running every exit path goes through `controller.stop()`.
async fn run(
    config: &Config,
    subscriber: Arc<dyn Subscriber>,
    metrics: Arc<Metrics>,
    health: Arc<HealthRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<WorkerReport> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let worker = IngestionWorker::new(
        subscriber,
        config.redpanda.consumer.topic.clone(),
        config.redpanda.consumer.group_id.clone(),
        metrics.clone(),
        health.clone(),
    )
    .with_config(config.worker.clone());

    let controller = WorkerController::start(worker)
        .await
        .context("Failed to start ingestion worker")?;

    let state = AppState::new(
        config.service_name.clone(),
        metrics,
        health,
        controller.status(),
    );
    let app = router(state);

    info!("Listening on http://{}", addr);

    // Run server with graceful shutdown
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error");

    info!("Shutting down...");

    let report = controller.stop().await;
    if let Some(close_error) = &report.close_error {
        error!(error = %close_error, "Subscription did not close cleanly");
    }

    served.map(|()| report)
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INGESTION")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(brokers) = std::env::var("INGESTION_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("INGESTION_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(topic) = std::env::var("INGESTION_REDPANDA_TOPIC") {
        config.redpanda.consumer.topic = topic;
    }
    if let Ok(group_id) = std::env::var("INGESTION_REDPANDA_GROUP_ID") {
        config.redpanda.consumer.group_id = group_id;
    }
    if let Ok(partitions) = std::env::var("INGESTION_REDPANDA_PARTITIONS") {
        config.redpanda.consumer.partitions = partitions
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .context("INGESTION_REDPANDA_PARTITIONS must be a comma-separated list of integers")?;
    }
    if let Ok(max_in_flight) = std::env::var("INGESTION_WORKER_MAX_IN_FLIGHT") {
        config.worker.max_in_flight = Some(
            max_in_flight
                .parse()
                .context("INGESTION_WORKER_MAX_IN_FLIGHT must be a positive integer")?,
        );
    }

    Ok(config)
}

/// Probe Redpanda on startup and seed its health component.
async fn check_health(config: &Config, health: &HealthRegistry) {
    if redpanda::health::check_connection(&config.redpanda).await {
        health.redpanda.set_healthy();
        info!("Redpanda connection: healthy");

        if !redpanda::health::topic_exists(&config.redpanda).await {
            warn!(topic = %config.redpanda.consumer.topic, "Sighting topic does not exist yet");
        }
    } else {
        health.redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
