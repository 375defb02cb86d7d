// File ingestion: endpoint descriptors, category routing, and the download orchestrator

pub mod category;
pub mod endpoint;
pub mod orchestrator;

pub use category::{CategoryMatcher, CategoryRule};
pub use endpoint::{EndpointDescriptor, EndpointOverrides};
pub use orchestrator::{BatchReport, IngestionOutcome, Orchestrator};
