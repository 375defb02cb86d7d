use crate::config::{Encryption, ProviderConfig};
use crate::error::{GatewayError, Result};
use crate::ingestion::category::CategoryMatcher;
use std::fmt;
use std::path::PathBuf;

pub const PROTOCOL: &str = "ftp";

/// One remote file-transfer target. Built per request, immutable afterwards.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Working directory entered right after login.
    pub base_directory: String,
    /// Single file to fetch; `None` walks the whole working directory tree.
    pub remote_path: Option<String>,
    pub local_directory: PathBuf,
    /// chrono strftime pattern appended to colliding local file names.
    pub rename_format: Option<String>,
    pub encryption: Encryption,
    pub ignore_certificate_errors: bool,
    pub categories: CategoryMatcher,
}

/// Request-supplied values layered over the provider defaults.
#[derive(Debug, Clone, Default)]
pub struct EndpointOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub base_directory: Option<String>,
    pub remote_path: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl EndpointDescriptor {
    pub fn merge(provider: &ProviderConfig, overrides: EndpointOverrides) -> Result<Self> {
        let categories = CategoryMatcher::compile(&provider.categories).map_err(|e| {
            GatewayError::Config(format!("provider '{}': {}", provider.provider, e))
        })?;

        let host = non_blank(overrides.host).unwrap_or_else(|| provider.host.clone());
        if host.trim().is_empty() {
            return Err(GatewayError::InvalidArguments(format!(
                "no host for provider '{}'",
                provider.provider
            )));
        }

        Ok(Self {
            host,
            port: overrides.port.unwrap_or(provider.port),
            user: non_blank(overrides.user).unwrap_or_else(|| provider.user.clone()),
            password: overrides
                .password
                .unwrap_or_else(|| provider.password.clone()),
            base_directory: non_blank(overrides.base_directory)
                .unwrap_or_else(|| provider.base_directory.clone()),
            remote_path: non_blank(overrides.remote_path)
                .or_else(|| non_blank(provider.remote_path.clone())),
            local_directory: provider.local_directory.clone(),
            rename_format: non_blank(provider.rename_format.clone()),
            encryption: provider.encryption,
            ignore_certificate_errors: provider.ignore_certificate_errors,
            categories,
        })
    }

    /// Remote location reported in outcome lines: the file, or the tree root.
    pub fn display_path(&self) -> &str {
        self.remote_path.as_deref().unwrap_or(&self.base_directory)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}@{}{}",
            PROTOCOL,
            self.user,
            self.password,
            self.host,
            self.display_path()
        )
    }
}
