pub mod rosas_trade;

use crate::config::Config;
use crate::ingestion::Orchestrator;
use crate::soap::OperationRegistry;
use std::sync::Arc;

/// Registry with every operation this gateway serves.
pub fn registry(config: Arc<Config>, orchestrator: Arc<Orchestrator>) -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    registry.register(
        rosas_trade::OPERATION,
        Arc::new(rosas_trade::RosasTradeHandler::new(config, orchestrator)),
    );
    registry
}
