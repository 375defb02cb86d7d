use crate::app::ports::TransferConnector;
use crate::config::Config;
use crate::error::GatewayError;
use crate::handlers;
use crate::ingestion::Orchestrator;
use crate::soap::{decode, EnvelopeEncoder, OperationRegistry, ResponseEnvelope};
use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

const BUNDLED_CAPABILITY_DOCUMENT: &str = include_str!("../assets/wsdl/ROSASTradeService.wsdl");
const DEFAULT_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

pub const SOAP_ACTION: &str = "soapaction";

/// Everything a request needs, shared read-only across requests.
pub struct GatewayState {
    pub registry: OperationRegistry,
    pub encoder: EnvelopeEncoder,
    pub service_namespace: String,
    pub capability_document: String,
}

impl GatewayState {
    pub fn from_config(
        config: Arc<Config>,
        connector: Arc<dyn TransferConnector>,
    ) -> Result<Self, GatewayError> {
        let capability_document = match &config.server.capability_document {
            Some(path) => std::fs::read_to_string(path).map_err(|e| GatewayError::local_io(path, e))?,
            None => BUNDLED_CAPABILITY_DOCUMENT.to_string(),
        };
        let orchestrator = Arc::new(Orchestrator::new(connector));
        let encoder = EnvelopeEncoder::new(
            config.server.service_namespace.clone(),
            Some(config.server.result_element.clone()),
        );

        Ok(Self {
            registry: handlers::registry(config.clone(), orchestrator),
            encoder,
            service_namespace: config.server.service_namespace.clone(),
            capability_document,
        })
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "esb-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Last path segment of a `SOAPAction` value, without quotes.
fn action_from_header(value: &str) -> &str {
    value
        .trim()
        .trim_matches('"')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn capability_response(state: &GatewayState) -> Response {
    crate::metrics::gateway::capability_served();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        state.capability_document.clone(),
    )
        .into_response()
}

/// Writes the envelope, echoing `{action}Response` as the outbound `SOAPAction`.
fn envelope_response(state: &GatewayState, request_headers: &HeaderMap, xml: String) -> Response {
    let action = action_from_header(header_str(request_headers, SOAP_ACTION));
    let mut headers = HeaderMap::new();

    let content_type = request_headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);

    let response_action = format!("\"{}{}Response\"", state.service_namespace, action);
    if let Ok(value) = HeaderValue::from_str(&response_action) {
        headers.insert(HeaderName::from_static(SOAP_ACTION), value);
    }
    (StatusCode::OK, headers, xml).into_response()
}

fn failure_response(state: &GatewayState, headers: &HeaderMap, err: GatewayError) -> Response {
    warn!(error = %err, kind = err.kind(), "Request failed before dispatch");
    crate::metrics::gateway::dispatch_failure(err.kind());
    let operation = action_from_header(header_str(headers, SOAP_ACTION));
    let xml = state.encoder.fallback(operation, &ResponseEnvelope::from(&err));
    envelope_response(state, headers, xml)
}

async fn handle_soap(state: &GatewayState, method: Method, mut headers: HeaderMap, body: Bytes) -> Response {
    let text = match String::from_utf8(body.to_vec()) {
        Ok(text) => text,
        Err(e) => return failure_response(state, &headers, GatewayError::Parse(e.to_string())),
    };
    debug!(method = %method, body = %text, "Request received");

    if method == Method::GET || text.trim().is_empty() {
        return capability_response(state);
    }

    let envelope = match decode(&text) {
        Ok(envelope) => envelope,
        Err(err) => return failure_response(state, &headers, err),
    };

    let action = envelope.operation.local_name().to_string();
    let inbound = header_str(&headers, SOAP_ACTION).to_string();
    info!(soap_action = %inbound, action = %action, "Envelope decoded");
    if let Ok(value) = HeaderValue::from_str(&action) {
        headers.insert(HeaderName::from_static(SOAP_ACTION), value);
    }

    let response = state.registry.dispatch(&envelope).await;
    let xml = match state.encoder.encode_response(&envelope, &response) {
        Ok(xml) => xml,
        Err(err) => {
            warn!(error = %err, "Falling back to fixed-shape envelope");
            crate::metrics::gateway::encoding_fallback();
            state.encoder.fallback(&action, &ResponseEnvelope::from(&err))
        }
    };

    if response.is_success() {
        info!(action = %action, response = %xml, "Operation succeeded");
    } else {
        warn!(action = %action, response = %xml, "Operation failed");
    }
    envelope_response(state, &headers, xml)
}

/// SOAP entry point: any method, capability document on GET or empty body.
async fn soap_entry(
    Extension(state): Extension<Arc<GatewayState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::metrics::gateway::request_received();
    let started = Instant::now();
    let span = tracing::info_span!("soap_request", request_id = %Uuid::new_v4());
    let response = handle_soap(&state, method, headers, body).instrument(span).await;
    crate::metrics::gateway::request_duration(started.elapsed().as_secs_f64());
    response
}

/// Create the HTTP router with the SOAP route mounted at `route`.
///
/// Envelopes are not size-capped: every request body reaches `handle_soap`,
/// so callers always get a SOAP envelope back.
pub fn create_server(state: Arc<GatewayState>, route: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(route, any(soap_entry))
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Start the HTTP server on `bind`
pub async fn start_server(state: Arc<GatewayState>, bind: &str, route: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    let app = create_server(state, route);

    info!("SOAP gateway listening on http://{}{}", addr, route);
    info!("Health check: http://{}/health", addr);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
