pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;

pub mod handlers;
pub mod ingestion;
pub mod soap;

// Layered boundaries for application ports and infrastructure adapters
pub mod app;
pub mod infra;
