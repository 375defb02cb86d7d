// Seams between the ingestion workflow and concrete transfer protocols
pub mod ports;
