use crate::app::ports::{EntryKind, RemoteEntry, TransferConnector, TransferSession};
use crate::config::Encryption;
use crate::error::TransferError;
use crate::ingestion::endpoint::EndpointDescriptor;
use async_trait::async_trait;
use native_tls::TlsConnector;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::time::Duration;
use suppaftp::list::File;
use suppaftp::types::FileType;
use suppaftp::{FtpError, NativeTlsConnector, NativeTlsFtpStream};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 64 * 1024;
const CHUNKS_IN_FLIGHT: usize = 8;

/// Opens FTP/FTPS sessions with bounded connect and I/O waits.
///
/// suppaftp's client is blocking, so every protocol step runs on the blocking
/// pool and the async side enforces the timeouts.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl FtpConnector {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self { connect_timeout, io_timeout }
    }
}

#[async_trait]
impl TransferConnector for FtpConnector {
    async fn open(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn TransferSession>, TransferError> {
        let target = Target::from(endpoint);
        let (connect_timeout, io_timeout) = (self.connect_timeout, self.io_timeout);
        let task = tokio::task::spawn_blocking(move || target.connect(connect_timeout, io_timeout));
        let stream = bounded(connect_timeout + io_timeout, "connect", task).await??;

        Ok(Box::new(FtpSession {
            stream: Some(stream),
            io_timeout,
            mlsd: true,
        }))
    }
}

/// Owned copy of the endpoint fields the blocking connect needs.
struct Target {
    host: String,
    port: u16,
    user: String,
    password: String,
    base_directory: String,
    encryption: Encryption,
    ignore_certificate_errors: bool,
}

impl From<&EndpointDescriptor> for Target {
    fn from(endpoint: &EndpointDescriptor) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            user: endpoint.user.clone(),
            password: endpoint.password.clone(),
            base_directory: endpoint.base_directory.trim().to_string(),
            encryption: endpoint.encryption,
            ignore_certificate_errors: endpoint.ignore_certificate_errors,
        }
    }
}

impl Target {
    fn tls(&self) -> Result<NativeTlsConnector, TransferError> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.ignore_certificate_errors)
            .danger_accept_invalid_hostnames(self.ignore_certificate_errors)
            .build()
            .map_err(|e| TransferError::Tls(e.to_string()))?;
        Ok(NativeTlsConnector::from(connector))
    }

    fn connect(&self, connect_timeout: Duration, io_timeout: Duration) -> Result<NativeTlsFtpStream, TransferError> {
        let addr_text = format!("{}:{}", self.host, self.port);
        let addr = addr_text
            .to_socket_addrs()
            .map_err(|source| TransferError::Connect { addr: addr_text.clone(), source })?
            .next()
            .ok_or_else(|| TransferError::Connect {
                addr: addr_text.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve"),
            })?;
        let refused = |e: FtpError| match e {
            FtpError::ConnectionError(source) => TransferError::Connect { addr: addr_text.clone(), source },
            other => ftp_error("connect", other),
        };

        let mut stream = match self.encryption {
            Encryption::None => NativeTlsFtpStream::connect_timeout(addr, connect_timeout).map_err(refused)?,
            Encryption::Explicit => NativeTlsFtpStream::connect_timeout(addr, connect_timeout)
                .map_err(refused)?
                .into_secure(self.tls()?, &self.host)
                .map_err(|e| ftp_error("AUTH TLS", e))?,
            Encryption::Implicit => {
                NativeTlsFtpStream::connect_secure_implicit(addr, self.tls()?, &self.host).map_err(refused)?
            }
        };
        stream.get_ref().set_read_timeout(Some(io_timeout))?;
        stream.get_ref().set_write_timeout(Some(io_timeout))?;

        let user = if self.user.is_empty() { "anonymous" } else { self.user.as_str() };
        stream
            .login(user, self.password.as_str())
            .map_err(|e| ftp_error("login", e))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| ftp_error("TYPE", e))?;
        if !self.base_directory.is_empty() {
            stream
                .cwd(&self.base_directory)
                .map_err(|e| ftp_error("CWD", e))?;
        }
        debug!(addr = %addr_text, encryption = ?self.encryption, "FTP session ready");
        Ok(stream)
    }
}

pub struct FtpSession {
    /// `None` once closed, or after a timed-out step left it on a worker thread.
    stream: Option<NativeTlsFtpStream>,
    io_timeout: Duration,
    mlsd: bool,
}

impl FtpSession {
    fn take(&mut self, what: &str) -> Result<NativeTlsFtpStream, TransferError> {
        self.stream
            .take()
            .ok_or_else(|| TransferError::Malformed(format!("{}: session is no longer usable", what)))
    }

    /// Runs one blocking protocol step and hands the stream back.
    async fn blocking<T, F>(&mut self, what: &'static str, op: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(&mut NativeTlsFtpStream) -> Result<T, TransferError> + Send + 'static,
    {
        let mut stream = self.take(what)?;
        let task = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        });
        let (stream, result) = bounded(self.io_timeout, what, task).await?;
        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl TransferSession for FtpSession {
    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let path = (!dir.is_empty()).then(|| dir.to_string());

        if self.mlsd {
            let mlsd_path = path.clone();
            let lines = self
                .blocking("MLSD", move |s| match s.mlsd(mlsd_path.as_deref()) {
                    Ok(lines) => Ok(Some(lines)),
                    Err(FtpError::UnexpectedResponse(reply)) if unsupported(reply.status.code()) => Ok(None),
                    Err(e) => Err(ftp_error("MLSD", e)),
                })
                .await?;
            match lines {
                Some(lines) => {
                    return Ok(lines
                        .iter()
                        .filter_map(|line| File::from_mlsx_line(line.trim_end()).ok())
                        .filter_map(remote_entry)
                        .collect())
                }
                None => {
                    debug!("MLSD unsupported, falling back to LIST");
                    self.mlsd = false;
                }
            }
        }

        let lines = self
            .blocking("LIST", move |s| s.list(path.as_deref()).map_err(|e| ftp_error("LIST", e)))
            .await?;
        Ok(lines
            .iter()
            .filter_map(|line| File::from_str(line.trim_end()).ok())
            .filter_map(remote_entry)
            .collect())
    }

    async fn retrieve(
        &mut self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError> {
        let mut stream = self.take("RETR")?;
        let remote = path.to_string();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHUNKS_IN_FLIGHT);

        let task = tokio::task::spawn_blocking(move || {
            let result = stream.retr(remote.as_str(), |reader: &mut dyn Read| {
                let mut buf = vec![0u8; READ_CHUNK];
                loop {
                    let n = reader.read(&mut buf).map_err(FtpError::ConnectionError)?;
                    if n == 0 {
                        return Ok(());
                    }
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        return Err(FtpError::ConnectionError(std::io::Error::new(
                            std::io::ErrorKind::BrokenPipe,
                            "receiver dropped",
                        )));
                    }
                }
            });
            (stream, result)
        });

        let mut total = 0u64;
        let mut sink_error = None;
        loop {
            match tokio::time::timeout(self.io_timeout, rx.recv()).await {
                Ok(Some(chunk)) => {
                    if let Err(e) = sink.write_all(&chunk).await {
                        sink_error = Some(e);
                        break;
                    }
                    total += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(_) => return Err(TransferError::Timeout("RETR".to_string())),
            }
        }
        drop(rx);

        let (stream, result) = bounded(self.io_timeout, "RETR", task).await?;
        self.stream = Some(stream);
        if let Some(e) = sink_error {
            return Err(TransferError::Sink(e));
        }
        result.map_err(|e| ftp_error("RETR", e))?;
        Ok(total)
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        if self.stream.is_none() {
            return Ok(());
        }
        let result = self
            .blocking("QUIT", |s| s.quit().map_err(|e| ftp_error("QUIT", e)))
            .await;
        self.stream = None;
        result
    }
}

async fn bounded<T>(limit: Duration, what: &str, task: JoinHandle<T>) -> Result<T, TransferError> {
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TransferError::Io(std::io::Error::other(format!("{} worker failed: {}", what, e)))),
        Err(_) => Err(TransferError::Timeout(what.to_string())),
    }
}

/// Replies meaning "this server does not know the command".
fn unsupported(code: u32) -> bool {
    matches!(code, 500 | 501 | 502 | 504)
}

fn ftp_error(command: &str, err: FtpError) -> TransferError {
    match err {
        FtpError::UnexpectedResponse(reply) => TransferError::Reply {
            command: command.to_string(),
            code: u16::try_from(reply.status.code()).unwrap_or(u16::MAX),
            message: String::from_utf8_lossy(&reply.body).trim().to_string(),
        },
        FtpError::ConnectionError(e) => TransferError::Io(e),
        FtpError::SecureError(e) => TransferError::Tls(e),
        other => TransferError::Malformed(format!("{}: {}", command, other)),
    }
}

/// Files and directories only; links and the `.`/`..` entries are skipped.
fn remote_entry(file: File) -> Option<RemoteEntry> {
    let name = file.name();
    if name.is_empty() || name == "." || name == ".." || file.is_symlink() {
        return None;
    }
    if file.is_directory() {
        Some(RemoteEntry::directory(name))
    } else if file.is_file() {
        Some(RemoteEntry {
            name: name.to_string(),
            kind: EntryKind::File,
            size: Some(file.size() as u64),
        })
    } else {
        None
    }
}
