//! Chainpay Server
//!
//! A custodial multi-chain payment gateway: receives provider deposit
//! notifications, reconciles them against expected payments and sends payouts.

mod api;
mod config;
mod engines;
mod server;
mod shutdown;
mod state;

use chainpay_core::collaborators::KmsClient;
use chainpay_core::events::payment_event_channel;
use chainpay_core::processors::{ConfirmationWatcher, NotificationSender};
use chainpay_core::store::{PaymentStore, PgStore};
use clap::Parser;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Chainpay - custodial multi-chain payment gateway
#[derive(Parser, Debug)]
#[command(name = "chainpay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./chainpay-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "CHAINPAY_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_json);

    tracing::info!("Starting chainpay-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!(
        chains = loaded_config.rpc.len(),
        merchants = loaded_config.merchants.len(),
        "Configuration loaded from {:?}",
        args.config
    );

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let listen_addr = loaded_config.listen;
    let policy = loaded_config.confirmation;
    let signer = Arc::new(KmsClient::new(
        loaded_config.kms.url.clone(),
        loaded_config.kms.timeout,
    ));

    let store: Arc<dyn PaymentStore> = Arc::new(PgStore::new(db_pool.clone()));
    let (event_tx, event_rx) = payment_event_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(store.clone(), loaded_config, event_tx.clone(), signer);

    // Background processors
    let watcher = ConfirmationWatcher::new(
        store.clone(),
        state.broadcaster.clone(),
        event_tx,
        policy,
        shutdown_rx.clone(),
    );
    let sender = NotificationSender::new(
        store,
        Arc::new(state.merchants.clone()),
        state.currencies.clone(),
        event_rx,
        shutdown_rx,
    );
    let watcher_handle = tokio::spawn(watcher.run());
    let sender_handle = tokio::spawn(sender.run());

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background work before the pool goes away
    reload_notify.notify_one();
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("Processors already stopped");
    }
    for (name, handle) in [("ConfirmationWatcher", watcher_handle), ("NotificationSender", sender_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(processor = name, error = %e, "Processor task failed");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
