use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Envelope parse failed: {0}")]
    Parse(String),

    #[error("[SOAPAction:{0}] is not implemented")]
    UnimplementedOperation(String),

    #[error("Transfer failed: {0}")]
    Transport(#[from] TransferError),

    #[error("Local I/O failed on {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Response encoding failed: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn local_io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        GatewayError::LocalIo {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Parse(_) => "parse",
            GatewayError::UnimplementedOperation(_) => "unimplemented",
            GatewayError::Transport(_) => "transport",
            GatewayError::LocalIo { .. } => "local_io",
            GatewayError::Encoding(_) => "encoding",
            GatewayError::Config(_) | GatewayError::Toml(_) => "config",
            GatewayError::InvalidArguments(_) => "invalid_arguments",
        }
    }
}

/// Failures raised by a transfer session (connect, login, list, retrieve).
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("unexpected reply to {command}: {code} {message}")]
    Reply {
        command: String,
        code: u16,
        message: String,
    },

    #[error("malformed server reply: {0}")]
    Malformed(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local destination refused the bytes; the remote side was fine.
    #[error("local write failed: {0}")]
    Sink(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
