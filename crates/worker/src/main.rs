mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use itemupdate_core::{
    load_config, validate_config, AlmaConnector, AzureBlobStore, AzureQueueClient, Config,
    InstitutionApiClient, QueueWorker, SanitizedConfig, StorageAccount, UpdateService,
    UpdateSettings, WorkerSettings,
};

use api::create_router;
use metrics::REGISTRY;
use state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("ITEMUPDATE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    init_logging();

    // The file is optional; the deployment's environment variables suffice.
    let config_path = std::env::var("ITEMUPDATE_CONFIG").ok().map(PathBuf::from);
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("Loading configuration from environment"),
    }

    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        config = %serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default(),
        "Configuration loaded successfully"
    );

    once_cell::sync::Lazy::force(&REGISTRY);

    let timeout = Duration::from_secs(config.api_client_timeout_secs);

    let account = StorageAccount::from_connection_string(&config.storage.connection_string)
        .context("Invalid storage connection string")?;
    info!(
        "Storage endpoints: blob {}, queue {}",
        account.blob_endpoint, account.queue_endpoint
    );
    let objects = Arc::new(
        AzureBlobStore::new(account.clone(), timeout).context("Failed to create blob client")?,
    );
    let queues = Arc::new(
        AzureQueueClient::new(account, timeout, config.queues.message_encoding)
            .context("Failed to create queue client")?,
    );
    info!("Storage clients initialized");

    let credentials = Arc::new(
        InstitutionApiClient::new(
            &config.institution_api.endpoint,
            config.institution_api.api_key.clone(),
            timeout,
        )
        .context("Failed to create institution API client")?,
    );

    let catalog = Arc::new(AlmaConnector::new(config.catalog.base_url.clone()));
    info!("Catalog region: {}", config.catalog.region);

    let service = Arc::new(UpdateService::new(
        UpdateSettings::from(&config),
        objects,
        queues.clone(),
        credentials,
        catalog,
    ));

    let worker = Arc::new(QueueWorker::new(
        WorkerSettings::from(&config),
        queues,
        service,
    ));
    worker.start().await;
    info!("Queue worker started on {}", config.queues.update_queue);

    if config.server.enabled {
        serve(&config, worker).await
    } else {
        info!("Health server disabled in config");
        shutdown_signal().await;
        stop_worker(&worker).await;
        Ok(())
    }
}

async fn stop_worker(worker: &QueueWorker) {
    info!("Stopping queue worker...");
    worker.stop().await;
    info!("Queue worker stopped");
}

/// Serve health and metrics until shutdown. The worker stops before the server.
async fn serve(config: &Config, worker: Arc<QueueWorker>) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone(), Some(Arc::clone(&worker))));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let shutdown = async move {
        shutdown_signal().await;
        stop_worker(&worker).await;
        info!("Server shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
