use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete adsync configuration. Every section is optional in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub report_job: ReportJobConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for the connector run trigger.
    #[serde(default = "default_connector_port")]
    pub connector_port: u16,
    /// Port for the secret refresher.
    #[serde(default = "default_refresher_port")]
    pub refresher_port: u16,
    /// Bearer token guarding secret writes. Unset means open.
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_connector_port() -> u16 {
    8080
}

fn default_refresher_port() -> u16 {
    8081
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connector_port: default_connector_port(),
            refresher_port: default_refresher_port(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_path")]
    pub path: String,
}

fn default_warehouse_path() -> String {
    "warehouse.db".to_string()
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_secrets_path")]
    pub path: String,
    /// Base64 32-byte key. Normally supplied through `ADSYNC_ENCRYPTION_KEY`.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_secrets_path() -> String {
    "secrets.db".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            path: default_secrets_path(),
            encryption_key: None,
        }
    }
}

/// Overrides each connector's default lookback when set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowConfig {
    #[serde(default)]
    pub days_reprocess: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportJobConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_wait_secs() -> u64 {
    600
}

impl Default for ReportJobConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl ReportJobConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Shared client with the per-call timeout applied.
    pub fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent("adsync/0.1")
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))
}

impl AppConfig {
    /// Reads `ADSYNC_CONFIG` if set (defaults otherwise), then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("ADSYNC_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => AppConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PORT") {
            self.server.connector_port = v.parse().context("PORT must be a valid port number")?;
        }
        if let Some(v) = lookup("REFRESHER_PORT") {
            self.server.refresher_port =
                v.parse().context("REFRESHER_PORT must be a valid port number")?;
        }
        if let Some(v) = lookup("ADSYNC_ADMIN_TOKEN") {
            self.server.admin_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("ADSYNC_WAREHOUSE_DB") {
            self.warehouse.path = v;
        }
        if let Some(v) = lookup("ADSYNC_SECRETS_DB") {
            self.secrets.path = v;
        }
        if let Some(v) = lookup("ADSYNC_ENCRYPTION_KEY") {
            self.secrets.encryption_key = Some(v);
        }
        if let Some(v) = lookup("DAYS_REPROCESS") {
            self.window.days_reprocess =
                Some(v.parse().context("DAYS_REPROCESS must be a non-negative integer")?);
        }
        Ok(())
    }

    /// The encryption key, which has no usable default.
    pub fn encryption_key(&self) -> Result<&str> {
        self.secrets
            .encryption_key
            .as_deref()
            .context("ADSYNC_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")
    }
}
