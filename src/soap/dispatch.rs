use crate::error::{GatewayError, Result};
use crate::soap::encode::ResponseEnvelope;
use crate::soap::envelope::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

const ASYNC_SUFFIX: &str = "async";

/// Implementation of one named operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<ResponseEnvelope>;
}

/// Operation handlers keyed by lower-cased name, built once at startup.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn OperationHandler>) {
        self.handlers.insert(name.to_lowercase(), handler);
    }

    /// Case-insensitive lookup of `name`, then `{name}Async`, then `name`
    /// without a trailing `Async`.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        let key = name.to_lowercase();
        if let Some(handler) = self.handlers.get(&key) {
            return Some(handler.clone());
        }
        if let Some(handler) = self.handlers.get(&format!("{}{}", key, ASYNC_SUFFIX)) {
            return Some(handler.clone());
        }
        key.strip_suffix(ASYNC_SUFFIX)
            .filter(|base| !base.is_empty())
            .and_then(|base| self.handlers.get(base))
            .cloned()
    }

    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Runs the operation named by the envelope. Every failure, including a
    /// panicking handler, becomes a `result_code = 1` response.
    pub async fn dispatch(&self, envelope: &Envelope) -> ResponseEnvelope {
        let action = envelope.operation.local_name().to_string();
        let Some(handler) = self.resolve(&action) else {
            let err = GatewayError::UnimplementedOperation(action);
            warn!(error = %err, "No handler registered");
            crate::metrics::gateway::dispatch_failure(err.kind());
            return ResponseEnvelope::from(&err);
        };

        info!(action = %action, "Dispatching operation");
        let owned = envelope.clone();
        let task = tokio::spawn(async move { handler.handle(&owned).await });

        match task.await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                error!(action = %action, error = %err, kind = err.kind(), "Operation failed");
                crate::metrics::gateway::dispatch_failure(err.kind());
                ResponseEnvelope::from(&err)
            }
            Err(join_err) => {
                error!(action = %action, error = %join_err, "Operation handler aborted");
                crate::metrics::gateway::dispatch_failure("panic");
                ResponseEnvelope::failure(format!("[SOAPAction:{}] handler aborted", action))
            }
        }
    }
}
