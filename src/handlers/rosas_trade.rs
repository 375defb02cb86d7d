use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::ingestion::{EndpointDescriptor, EndpointOverrides, Orchestrator};
use crate::soap::{Envelope, OperationHandler, ResponseEnvelope};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const OPERATION: &str = "ROSASTradeAsync";
pub const SERVICE_PARAS: &str = "serviceParas";

/// `<WholeMsg><province>...</province>...</WholeMsg>`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceParas {
    #[serde(rename = "province", default)]
    pub provinces: Vec<Province>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Province {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path: String,
}

impl ServiceParas {
    /// Whitespace around the document (as left by pretty-printed envelopes) is ignored.
    pub fn parse(xml: &str) -> Result<Self> {
        let paras: ServiceParas = quick_xml::de::from_str(xml.trim()).map_err(|e| {
            GatewayError::InvalidArguments(format!("failed to parse {}: {}", SERVICE_PARAS, e))
        })?;
        if paras.provinces.is_empty() {
            return Err(GatewayError::InvalidArguments(format!(
                "failed to parse {}: no province data",
                SERVICE_PARAS
            )));
        }
        Ok(paras)
    }
}

impl Province {
    /// Blank paths are skipped; a trailing `/` asks for the whole directory tree.
    fn overrides(&self) -> Option<EndpointOverrides> {
        let path = self.path.trim();
        if path.is_empty() {
            return None;
        }
        let (base_directory, remote_path) = if path.ends_with('/') {
            (Some(path.to_string()), None)
        } else {
            (None, Some(path.to_string()))
        };
        Some(EndpointOverrides {
            host: Some(self.ip.trim().to_string()),
            port: None,
            user: Some(self.user.clone()),
            password: Some(self.password.clone()),
            base_directory,
            remote_path,
        })
    }
}

/// Downloads the files named in `serviceParas` from each province's FTP server.
pub struct RosasTradeHandler {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
}

impl RosasTradeHandler {
    pub fn new(config: Arc<Config>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { config, orchestrator }
    }

    pub fn endpoints(&self, paras: &ServiceParas) -> Result<Vec<EndpointDescriptor>> {
        let key = &self.config.ingest.provider;
        let provider = self.config.provider(key).ok_or_else(|| {
            GatewayError::Config(format!("no [[providers]] entry for '{}'", key))
        })?;

        paras
            .provinces
            .iter()
            .filter_map(|p| {
                let overrides = p.overrides();
                if overrides.is_none() {
                    debug!(ip = %p.ip, "Skipping province without path");
                }
                overrides
            })
            .map(|overrides| EndpointDescriptor::merge(provider, overrides))
            .collect()
    }
}

#[async_trait]
impl OperationHandler for RosasTradeHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<ResponseEnvelope> {
        let xml = envelope
            .argument(SERVICE_PARAS)
            .map(|a| a.value.as_str())
            .ok_or_else(|| {
                GatewayError::InvalidArguments(format!("failed to parse {}: argument missing", SERVICE_PARAS))
            })?;
        let paras = ServiceParas::parse(xml)?;
        let endpoints = self.endpoints(&paras)?;
        info!(provinces = paras.provinces.len(), endpoints = endpoints.len(), "ROSASTrade batch");

        let report = self.orchestrator.ingest(&endpoints).await;
        let message = report.message();
        Ok(if report.success() {
            ResponseEnvelope::success(message)
        } else {
            ResponseEnvelope::failure(message)
        })
    }
}
