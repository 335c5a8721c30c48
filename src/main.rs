use adsync::api::{create_router, RefresherState};
use adsync::config::AppConfig;
use adsync::secrets::{SecretRefresher, SecretStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adsync=info,tower_http=info".into()),
        )
        .init();

    info!("Secret refresher starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;
    let encryption_key = config.encryption_key()?;

    info!(
        secrets_db = %config.secrets.path,
        port = config.server.refresher_port,
        admin_token = config.server.admin_token.is_some(),
        "Configuration loaded"
    );

    let store = Arc::new(
        SecretStore::new(&config.secrets.path, encryption_key)
            .context("Failed to initialize secret store")?,
    );
    let http_client = config.http.client()?;
    let refresher = Arc::new(SecretRefresher::new(Arc::clone(&store), http_client));

    let router = create_router(RefresherState {
        store,
        refresher,
        admin_token: config.server.admin_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.refresher_port))
        .await
        .context("Failed to bind refresher port")?;
    info!(port = config.server.refresher_port, "Secret refresher listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Refresher server error")?;

    info!("Secret refresher stopped");
    Ok(())
}
