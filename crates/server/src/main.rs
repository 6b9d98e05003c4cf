use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screenflow_core::config::CONFIG_PATH_ENV;
use screenflow_core::{
    create_authenticator, load_config, validate_config, Authenticator, BroadcastEventBus,
    Collaborators, Config, DocumentDispatcher, DocumentStore, FsObjectStorage,
    HttpParsingClient, LogFormat, MemoryWorkQueue, ObjectStorage, ProgressPublisher,
    QueueBackend, QueueStatusAggregator, SanitizedConfig, SqliteDocumentStore, SqliteWorkQueue,
    WorkQueue,
};
use screenflow_server::api::create_router;
use screenflow_server::gateway::ConnectionRegistry;
use screenflow_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration (logging is configured from it, so errors go to stderr)
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {:?}: {}", config_path, e);
            return Err(e).with_context(|| format!("Failed to load config from {:?}", config_path));
        }
    };

    init_logging(&config);
    info!(version = VERSION, "Starting screenflow");
    info!("Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Auth method: {}", config.auth.method.as_str());
    info!("Database path: {:?}", config.database.path);

    // Config fingerprint
    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Create SQLite document store
    let store: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::new(&config.database.path)
            .context("Failed to create document store")?,
    );
    info!("Document store initialized");

    // Create work queue
    let queue: Arc<dyn WorkQueue> = match config.dispatcher.queue {
        QueueBackend::Sqlite => Arc::new(
            SqliteWorkQueue::new(&config.database.path, config.dispatcher.lease())
                .context("Failed to create work queue")?,
        ),
        QueueBackend::Memory => Arc::new(MemoryWorkQueue::new(config.dispatcher.lease())),
    };
    info!("Work queue initialized ({:?})", config.dispatcher.queue);

    // Object storage for uploads
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(FsObjectStorage::new(config.storage.root.clone()));
    info!("Object storage rooted at {:?}", config.storage.root);

    // Parsing service client (parser, matcher and profile analysis share one endpoint)
    let mut client = HttpParsingClient::new(
        config.collaborators.base_url.clone(),
        std::time::Duration::from_secs(config.collaborators.timeout_secs),
    )
    .context("Failed to create parsing service client")?;
    if let Some(api_key) = &config.collaborators.api_key {
        client = client.with_api_key(api_key.clone());
    }
    let client = Arc::new(client);
    info!("Parsing service at {}", config.collaborators.base_url);

    let collaborators = Collaborators {
        storage: Arc::clone(&storage),
        parser: client.clone(),
        matcher: client.clone(),
        profiles: client,
    };

    // Event bus, status aggregation and the dispatcher
    let bus = Arc::new(BroadcastEventBus::new(config.gateway.channel_capacity));
    let aggregator = Arc::new(QueueStatusAggregator::new(
        Arc::clone(&store),
        config.status.clone(),
    ));
    let dispatcher = Arc::new(DocumentDispatcher::new(
        config.dispatcher.clone(),
        Arc::clone(&store),
        queue,
        collaborators,
        ProgressPublisher::new(bus.clone()),
        Arc::clone(&aggregator),
    ));

    if config.dispatcher.enabled {
        dispatcher
            .start()
            .await
            .context("Failed to start dispatcher")?;
    } else {
        info!("Dispatcher disabled, documents will stay queued");
    }

    // WebSocket fan-out
    let registry = Arc::new(ConnectionRegistry::new(
        bus,
        config.gateway.channel_capacity,
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);

    let state = Arc::new(AppState::new(
        config,
        authenticator,
        store,
        storage,
        Arc::clone(&dispatcher),
        aggregator,
        Arc::clone(&registry),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    let shutdown_registry = Arc::clone(&registry);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Sockets hold their connections open; close them so serve can return
        shutdown_registry.close_all().await;
    })
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    if dispatcher.is_running() {
        info!("Stopping dispatcher...");
        dispatcher.stop().await;
        info!("Dispatcher stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
