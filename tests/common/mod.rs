#![allow(dead_code)]

use async_trait::async_trait;
use esb_gateway::app::ports::{RemoteEntry, TransferConnector, TransferSession};
use esb_gateway::config::Encryption;
use esb_gateway::error::TransferError;
use esb_gateway::ingestion::{CategoryMatcher, CategoryRule, EndpointDescriptor};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Children of `dir` in a flat `a/b/c.txt` keyed tree: (subdirectories, files).
fn children(files: &BTreeMap<String, Vec<u8>>, dir: &str) -> (BTreeSet<String>, Vec<(String, usize)>) {
    let dir = dir.trim_matches('/');
    let mut dirs = BTreeSet::new();
    let mut leaves = Vec::new();
    for (path, body) in files {
        let rest = if dir.is_empty() {
            path.as_str()
        } else {
            match path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            }
        };
        match rest.split_once('/') {
            Some((sub, _)) => {
                dirs.insert(sub.to_string());
            }
            None => leaves.push((rest.to_string(), body.len())),
        }
    }
    (dirs, leaves)
}

pub fn tree(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
    entries
        .iter()
        .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
        .collect()
}

pub fn matcher() -> CategoryMatcher {
    CategoryMatcher::compile(&[
        CategoryRule {
            pattern: "^IMG".to_string(),
            regex: true,
            ignore_case: true,
            subdirectory: "images".to_string(),
        },
        CategoryRule {
            pattern: "report".to_string(),
            regex: false,
            ignore_case: true,
            subdirectory: "reports".to_string(),
        },
    ])
    .expect("category rules compile")
}

pub fn endpoint(host: &str, port: u16, local: &Path, remote_path: Option<&str>) -> EndpointDescriptor {
    EndpointDescriptor {
        host: host.to_string(),
        port,
        user: "hb".to_string(),
        password: "secret".to_string(),
        base_directory: "/".to_string(),
        remote_path: remote_path.map(str::to_string),
        local_directory: local.to_path_buf(),
        rename_format: None,
        encryption: Encryption::None,
        ignore_certificate_errors: false,
        categories: matcher(),
    }
}

/// In-memory connector; every call is recorded in `events`.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub files: Arc<BTreeMap<String, Vec<u8>>>,
    pub unreachable: HashSet<String>,
    /// Remote paths whose bytes the local side refuses to accept.
    pub refused_writes: HashSet<String>,
    pub events: EventLog,
}

impl MemoryConnector {
    pub fn new(files: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            files: Arc::new(files),
            ..Default::default()
        }
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn refuse_write(mut self, path: &str) -> Self {
        self.refused_writes.insert(path.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferConnector for MemoryConnector {
    async fn open(&self, endpoint: &EndpointDescriptor) -> Result<Box<dyn TransferSession>, TransferError> {
        self.events.lock().unwrap().push(format!("open {}", endpoint.host));
        if self.unreachable.contains(&endpoint.host) {
            return Err(TransferError::Connect {
                addr: endpoint.socket_addr(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(Box::new(MemorySession {
            files: self.files.clone(),
            refused_writes: self.refused_writes.clone(),
            events: self.events.clone(),
        }))
    }
}

struct MemorySession {
    files: Arc<BTreeMap<String, Vec<u8>>>,
    refused_writes: HashSet<String>,
    events: EventLog,
}

#[async_trait]
impl TransferSession for MemorySession {
    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        self.events.lock().unwrap().push(format!("list {}", dir));
        let (dirs, files) = children(&self.files, dir);
        let mut entries: Vec<RemoteEntry> = files.into_iter().map(|(name, _)| RemoteEntry::file(name)).collect();
        entries.extend(dirs.into_iter().map(RemoteEntry::directory));
        Ok(entries)
    }

    async fn retrieve(
        &mut self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError> {
        self.events.lock().unwrap().push(format!("retrieve {}", path));
        let body = self
            .files
            .get(path.trim_start_matches('/'))
            .ok_or_else(|| TransferError::Reply {
                command: "RETR".to_string(),
                code: 550,
                message: "No such file".to_string(),
            })?;
        if self.refused_writes.contains(path) {
            return Err(TransferError::Sink(std::io::Error::other("no space left on device")));
        }
        sink.write_all(body).await.map_err(TransferError::Sink)?;
        Ok(body.len() as u64)
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        self.events.lock().unwrap().push("close".to_string());
        Ok(())
    }
}

/// Scripted FTP server on 127.0.0.1 serving `files` to user `hb` / `secret`.
pub struct FakeFtpServer {
    pub port: u16,
    pub commands: EventLog,
}

impl FakeFtpServer {
    pub async fn start(files: BTreeMap<String, Vec<u8>>, mlsd: bool) -> FakeFtpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind control");
        let port = listener.local_addr().expect("local addr").port();
        let commands: EventLog = Arc::default();
        let files = Arc::new(files);

        let log = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let files = files.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve_control(stream, files, mlsd, log).await;
                });
            }
        });
        FakeFtpServer { port, commands }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

async fn send_data(
    control: &mut (impl AsyncWrite + Unpin),
    passive: Option<TcpListener>,
    body: &[u8],
) -> std::io::Result<()> {
    let Some(listener) = passive else {
        return control.write_all(b"425 Use PASV first\r\n").await;
    };
    let (mut data, _) = listener.accept().await?;
    control.write_all(b"150 Opening data connection\r\n").await?;
    data.write_all(body).await?;
    data.shutdown().await?;
    drop(data);
    control.write_all(b"226 Transfer complete\r\n").await
}

async fn serve_control(
    stream: TcpStream,
    files: Arc<BTreeMap<String, Vec<u8>>>,
    mlsd: bool,
    log: EventLog,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut passive: Option<TcpListener> = None;
    let mut user = String::new();

    write.write_all(b"220 fake ftp ready\r\n").await?;
    while let Some(line) = lines.next_line().await? {
        log.lock().unwrap().push(line.clone());
        let (command, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match command.to_ascii_uppercase().as_str() {
            "USER" => {
                user = arg.to_string();
                write.write_all(b"331 Password required\r\n").await?;
            }
            "PASS" if user == "hb" && arg == "secret" => write.write_all(b"230 Logged in\r\n").await?,
            "PASS" => write.write_all(b"530 Login incorrect\r\n").await?,
            "TYPE" => write.write_all(b"200 Type set to I\r\n").await?,
            "CWD" => write.write_all(b"250 Directory changed\r\n").await?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                let reply = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    port / 256,
                    port % 256
                );
                write.write_all(reply.as_bytes()).await?;
            }
            // The passive listener stays bound so the client's data connect still lands.
            "MLSD" if !mlsd => write.write_all(b"502 Command not implemented\r\n").await?,
            "MLSD" => {
                let (dirs, leaves) = children(&files, arg);
                let mut listing = String::from("type=cdir;modify=20240101000000; .\r\n");
                for (name, size) in leaves {
                    listing.push_str(&format!("type=file;size={};modify=20240101000000; {}\r\n", size, name));
                }
                for name in dirs {
                    listing.push_str(&format!("type=dir;modify=20240101000000; {}\r\n", name));
                }
                send_data(&mut write, passive.take(), listing.as_bytes()).await?;
            }
            "LIST" => {
                let (dirs, leaves) = children(&files, arg);
                let mut listing = String::from("total 0\r\n");
                for (name, size) in leaves {
                    listing.push_str(&format!("-rw-r--r--   1 ftp  ftp {:>8} Jan 01 12:00 {}\r\n", size, name));
                }
                for name in dirs {
                    listing.push_str(&format!("drwxr-xr-x   2 ftp  ftp     4096 Jan 01 12:00 {}\r\n", name));
                }
                send_data(&mut write, passive.take(), listing.as_bytes()).await?;
            }
            "RETR" => match files.get(arg.trim_start_matches('/')) {
                Some(body) => send_data(&mut write, passive.take(), body).await?,
                None => write.write_all(b"550 No such file\r\n").await?,
            },
            "QUIT" => {
                write.write_all(b"221 Goodbye\r\n").await?;
                break;
            }
            _ => write.write_all(b"502 Command not implemented\r\n").await?,
        }
    }
    Ok(())
}
