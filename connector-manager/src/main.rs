use adsync::config::AppConfig;
use adsync::secrets::SecretStore;
use adsync::warehouse::Warehouse;
use adsync::IdempotentLoader;
use anyhow::{Context, Result};
use connector_manager::api::{create_router, ApiState};
use connector_manager::manager::ConnectorManager;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connector_manager=info,adsync=info,tower_http=info".into()),
        )
        .init();

    info!("Connector Manager starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!(
        warehouse_db = %config.warehouse.path,
        port = config.server.connector_port,
        days_reprocess = ?config.window.days_reprocess,
        "Configuration loaded"
    );

    let warehouse = Arc::new(
        Warehouse::open(&config.warehouse.path).context("Failed to open warehouse database")?,
    );
    let loader = IdempotentLoader::new(warehouse);

    // The secret store is optional: jobs may carry their credentials inline
    let secrets = match config.secrets.encryption_key.as_deref() {
        Some(key) => {
            let store = SecretStore::new(&config.secrets.path, key)
                .context("Failed to initialize secret store")?;
            info!(secrets_db = %config.secrets.path, "Secret store initialized");
            Some(Arc::new(store))
        }
        None => {
            warn!("ADSYNC_ENCRYPTION_KEY not set; jobs using secret_id will fail");
            None
        }
    };

    let http_client = config.http.client()?;
    let manager = ConnectorManager::from_config(&config, &http_client, loader, secrets);
    for connector in manager.connectors() {
        info!(connector = %connector.name(), platform = %connector.platform(), "Connector registered");
    }

    let router = create_router(ApiState {
        manager: Arc::new(manager),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.connector_port))
        .await
        .context("Failed to bind connector port")?;
    info!(port = config.server.connector_port, "Connector Manager listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Connector API server error")?;

    info!("Connector Manager stopped");
    Ok(())
}
