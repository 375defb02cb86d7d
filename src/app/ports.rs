use crate::error::TransferError;
use crate::ingestion::endpoint::EndpointDescriptor;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: EntryKind::File, size: None }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: EntryKind::Directory, size: None }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// An authenticated session against one endpoint, positioned in its base directory.
///
/// Paths are relative to that directory unless they start with `/`; the empty
/// path is the base directory itself.
#[async_trait]
pub trait TransferSession: Send {
    async fn list(&mut self, dir: &str) -> Result<Vec<RemoteEntry>, TransferError>;

    /// Streams `path` into `sink`, returning the number of bytes copied.
    async fn retrieve(
        &mut self,
        path: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, TransferError>;

    async fn close(&mut self) -> Result<(), TransferError>;
}

#[async_trait]
pub trait TransferConnector: Send + Sync {
    /// Connects and logs in.
    async fn open(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Box<dyn TransferSession>, TransferError>;
}
