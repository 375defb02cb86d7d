//! Prometheus metrics for the gateway and the ingestion workflow.
//!
//! Names live in [`MetricName`] so call sites never spell metric strings.

use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    GatewayRequests,
    GatewayCapabilityServed,
    GatewayDispatchFailures,
    GatewayEncodingFallbacks,
    GatewayRequestDuration,

    IngestEndpointsSuccess,
    IngestEndpointsFailure,
    IngestFilesDownloaded,
    IngestBytesDownloaded,
    IngestEndpointDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::GatewayRequests => "esb_gateway_requests_total",
            MetricName::GatewayCapabilityServed => "esb_gateway_capability_served_total",
            MetricName::GatewayDispatchFailures => "esb_gateway_dispatch_failures_total",
            MetricName::GatewayEncodingFallbacks => "esb_gateway_encoding_fallbacks_total",
            MetricName::GatewayRequestDuration => "esb_gateway_request_duration_seconds",

            MetricName::IngestEndpointsSuccess => "esb_ingest_endpoints_success_total",
            MetricName::IngestEndpointsFailure => "esb_ingest_endpoints_failure_total",
            MetricName::IngestFilesDownloaded => "esb_ingest_files_downloaded_total",
            MetricName::IngestBytesDownloaded => "esb_ingest_bytes_downloaded_total",
            MetricName::IngestEndpointDuration => "esb_ingest_endpoint_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installs the Prometheus exporter and registers metric descriptions.
pub fn init(listen: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen.parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe();
    tracing::info!("Prometheus exporter listening on http://{}/metrics", addr);
    Ok(())
}

fn describe() {
    use ::metrics::{describe_counter, describe_histogram};

    describe_counter!(MetricName::GatewayRequests.as_str(), "Requests received by the SOAP entry point");
    describe_counter!(
        MetricName::GatewayCapabilityServed.as_str(),
        "Requests answered with the capability document"
    );
    describe_counter!(
        MetricName::GatewayDispatchFailures.as_str(),
        "Requests answered with a failure envelope, by error kind"
    );
    describe_counter!(
        MetricName::GatewayEncodingFallbacks.as_str(),
        "Responses that fell back to the fixed-shape error envelope"
    );
    describe_histogram!(MetricName::GatewayRequestDuration.as_str(), "SOAP request handling time");
    describe_counter!(MetricName::IngestEndpointsSuccess.as_str(), "Endpoints ingested successfully");
    describe_counter!(MetricName::IngestEndpointsFailure.as_str(), "Endpoints that failed ingestion");
    describe_counter!(MetricName::IngestFilesDownloaded.as_str(), "Files written to local storage");
    describe_counter!(MetricName::IngestBytesDownloaded.as_str(), "Bytes written to local storage");
    describe_histogram!(MetricName::IngestEndpointDuration.as_str(), "Per-endpoint ingestion time");
}

pub mod gateway {
    use super::MetricName;

    pub fn request_received() {
        ::metrics::counter!(MetricName::GatewayRequests.as_str()).increment(1);
    }

    pub fn capability_served() {
        ::metrics::counter!(MetricName::GatewayCapabilityServed.as_str()).increment(1);
    }

    pub fn dispatch_failure(kind: &'static str) {
        ::metrics::counter!(MetricName::GatewayDispatchFailures.as_str(), "kind" => kind).increment(1);
    }

    pub fn encoding_fallback() {
        ::metrics::counter!(MetricName::GatewayEncodingFallbacks.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::GatewayRequestDuration.as_str()).record(secs);
    }
}

pub mod ingest {
    use super::MetricName;

    pub fn endpoint_finished(success: bool, secs: f64) {
        let name = if success {
            MetricName::IngestEndpointsSuccess
        } else {
            MetricName::IngestEndpointsFailure
        };
        ::metrics::counter!(name.as_str()).increment(1);
        ::metrics::histogram!(MetricName::IngestEndpointDuration.as_str()).record(secs);
    }

    pub fn file_downloaded(bytes: u64) {
        ::metrics::counter!(MetricName::IngestFilesDownloaded.as_str()).increment(1);
        ::metrics::counter!(MetricName::IngestBytesDownloaded.as_str()).increment(bytes);
    }
}
