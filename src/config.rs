use crate::error::{GatewayError, Result};
use crate::ingestion::category::{CategoryMatcher, CategoryRule};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub route: String,
    pub service_namespace: String,
    /// Element wrapping the payload inside `{operation}Response`.
    /// Empty means `{operation}Result`.
    pub result_element: String,
    pub capability_document: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            route: "/api/ROSASTradeService".to_string(),
            service_namespace: "http://tempuri.org/".to_string(),
            result_element: "Response".to_string(),
            capability_document: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub provider: String,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            provider: "HebeiESB".to_string(),
            connect_timeout_secs: 30,
            io_timeout_secs: 30,
        }
    }
}

impl IngestConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// Provider-level transfer defaults, looked up by `provider` key.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_base_directory")]
    pub base_directory: String,
    #[serde(default)]
    pub remote_path: Option<String>,
    pub local_directory: PathBuf,
    #[serde(default)]
    pub rename_format: Option<String>,
    #[serde(default)]
    pub encryption: Encryption,
    #[serde(default = "default_ignore_certificate_errors")]
    pub ignore_certificate_errors: bool,
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

/// Control-channel security for a provider's FTP servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Plain FTP.
    None,
    /// TLS from the first byte (FTPS on a dedicated port).
    #[default]
    Implicit,
    /// Plain connect upgraded with `AUTH TLS`.
    Explicit,
}

fn default_ignore_certificate_errors() -> bool {
    true
}

fn default_port() -> u16 {
    21
}

fn default_base_directory() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    pub listen: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for provider in &self.providers {
            if let Some(format) = provider.rename_format.as_deref() {
                validate_rename_format(format).map_err(|e| {
                    GatewayError::Config(format!("provider '{}': {}", provider.provider, e))
                })?;
            }
            CategoryMatcher::compile(&provider.categories).map_err(|e| {
                GatewayError::Config(format!("provider '{}': {}", provider.provider, e))
            })?;
        }
        Ok(())
    }

    /// Provider defaults for `key`, compared case-sensitively like the config file.
    pub fn provider(&self, key: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.provider == key)
    }
}

/// Rejects strftime patterns chrono would fail to render.
pub fn validate_rename_format(format: &str) -> std::result::Result<(), String> {
    if format.trim().is_empty() {
        return Err("rename_format is empty".to_string());
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid rename_format '{}'", format));
    }
    Ok(())
}
