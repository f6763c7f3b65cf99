//! # User-Sync HTTP Service
//!
//! HTTP server for receiving identity-provider webhooks and synchronizing
//! user events into the local record store.
//!
//! This service provides:
//! - The signed webhook endpoint with signature verification
//! - Health and readiness endpoints
//! - Request logging with correlation IDs
//!
//! The webhook endpoint always answers with one of four fixed JSON bodies;
//! error responses never expose internals beyond a short constant message.



use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};
use user_sync_core::{
    store::UserStore,
    webhook::{SyncOutcome, WebhookError, WebhookHeaders, WebhookProcessor, WebhookRequest},
};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Webhook processor for handling provider events
    pub processor: Arc<dyn WebhookProcessor>,

    /// Health checker for system monitoring
    pub health_checker: Arc<dyn HealthChecker>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        processor: Arc<dyn WebhookProcessor>,
        health_checker: Arc<dyn HealthChecker>,
    ) -> Self {
        Self {
            config,
            processor,
            health_checker,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Webhook verification settings
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Persistent store settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject configurations the service cannot run with.
    ///
    /// All fields carry defaults, so this is the only place hard
    /// requirements are enforced; the signing secret in particular has no
    /// usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must be non-zero".to_string(),
            });
        }

        if self.webhook.signing_secret.is_empty() {
            return Err(ConfigError::Missing {
                key: "webhook.signing_secret".to_string(),
            });
        }

        if !self.webhook.endpoint_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: "webhook.endpoint_path must start with '/'".to_string(),
            });
        }

        if self.webhook.tolerance_seconds <= 0 {
            return Err(ConfigError::Invalid {
                message: "webhook.tolerance_seconds must be positive".to_string(),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB; user events are small
        }
    }
}

/// Webhook verification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Shared signing secret (`whsec_...`), required at startup
    pub signing_secret: String,

    /// Clock tolerance for the signed timestamp, in seconds
    pub tolerance_seconds: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhooks/clerk".to_string(),
            signing_secret: String::new(),
            tolerance_seconds: 300,
        }
    }
}

/// Persistent store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection URL; when absent the service falls back to the
    /// in-memory store
    pub url: Option<String>,

    /// Connection pool size
    pub max_connections: Option<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes =
        Router::new().route(&state.config.webhook.endpoint_path, post(handle_webhook));

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let max_body_size = state.config.server.max_body_size;

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    processor: Arc<dyn WebhookProcessor>,
    health_checker: Arc<dyn HealthChecker>,
) -> Result<(), ServiceError> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ServiceError::BindFailed {
            address: format!("{}:{}", config.server.host, config.server.port),
            message: format!("not a valid socket address: {e}"),
        })?;

    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, processor, health_checker);
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.to_string(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
            },
        }
    };

    // In-flight requests are allowed to complete; new connections stop
    // being accepted as soon as the signal arrives.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle a provider webhook delivery.
///
/// The pipeline is linear: parse the three signature headers, hand the raw
/// body to the processor (verify, validate, normalize, dispatch), and map
/// the outcome to one of the four fixed responses. Failures at any step are
/// terminal for the request; nothing is retried.
#[instrument(skip(state, headers, body))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EventReceivedResponse>, WebhookHandlerError> {
    // Convert headers to a lowercase map
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();

    // Missing signature headers are a verification failure, not a
    // malformed-request failure.
    let webhook_headers = WebhookHeaders::from_http_headers(&header_map)
        .map_err(|e| WebhookHandlerError::Processing(e.into()))?;

    let request = WebhookRequest::new(webhook_headers, body);

    let outcome = state
        .processor
        .process(request)
        .await
        .map_err(WebhookHandlerError::Processing)?;

    if let SyncOutcome::Ignored { event_type } = &outcome {
        debug!(event_type = %event_type, "acknowledged event without mutation");
    }

    Ok(Json(EventReceivedResponse::new()))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic liveness check endpoint
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Response {
    let status = state.health_checker.check_health().await;

    let response = HealthResponse {
        status: if status.is_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: Utc::now(),
        checks: status.checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let code = if status.is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response)).into_response()
}

/// Readiness check for load balancers; reflects store connectivity
#[instrument(skip(state))]
async fn handle_readiness_check(State(state): State<AppState>) -> Response {
    let is_ready = state.health_checker.check_readiness().await;

    let response = ReadinessResponse {
        ready: is_ready,
        timestamp: Utc::now(),
    };

    let code = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response)).into_response()
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// This middleware:
/// - Extracts or generates correlation IDs for request tracking
/// - Logs request completion with structured fields
/// - Propagates the correlation ID through response headers
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

// ============================================================================
// Response Types
// ============================================================================

/// The single success body of the webhook endpoint.
#[derive(Debug, Serialize)]
pub struct EventReceivedResponse {
    pub message: String,
}

impl EventReceivedResponse {
    /// The fixed acknowledgement the provider expects.
    pub fn new() -> Self {
        Self {
            message: "Event received".to_string(),
        }
    }
}

impl Default for EventReceivedResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub checks: HashMap<String, HealthCheckResult>,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub timestamp: DateTime<Utc>,
}

/// Health check result for individual components
#[derive(Debug, Serialize, Clone)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Overall health status
#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub checks: HashMap<String, HealthCheckResult>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Webhook handler errors with HTTP status code mapping.
///
/// The three processing failure kinds are disjoint and map to exactly one
/// status and one fixed body each:
///
/// - verification failure → `400 {"error":"Invalid signature"}`
/// - invalid user data → `400 {"error":"Invalid user data"}`
/// - store failure → `500 {"error":"Internal server error"}`
///
/// Detailed reasons are logged server-side; the response bodies never carry
/// anything beyond the constant message.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    #[error("{0}")]
    Processing(#[from] WebhookError),
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let Self::Processing(err) = self;

        let (status, message) = match &err {
            WebhookError::Verification(reason) => {
                warn!(reason = %reason, "rejected webhook: signature verification failed");
                (StatusCode::BAD_REQUEST, "Invalid signature")
            }
            // Authentic but malformed payloads are rejected quietly.
            WebhookError::InvalidUserData(reason) => {
                debug!(reason = %reason, "rejected webhook: invalid user data");
                (StatusCode::BAD_REQUEST, "Invalid user data")
            }
            WebhookError::Store(reason) => {
                error!(error = %reason, "store mutation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

// ============================================================================
// Health Checking
// ============================================================================

/// Interface for system health monitoring
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    /// Liveness check (fast, no dependencies)
    async fn check_health(&self) -> HealthStatus;

    /// Readiness check for load balancers
    async fn check_readiness(&self) -> bool;
}

/// Health checker backed by the user store.
///
/// Liveness only asserts the process is serving; readiness additionally
/// probes the store so traffic is withheld while the database is down.
pub struct DefaultHealthChecker {
    store: Arc<dyn UserStore>,
}

impl DefaultHealthChecker {
    /// Create a health checker over the store the service mutates.
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl HealthChecker for DefaultHealthChecker {
    async fn check_health(&self) -> HealthStatus {
        let start = std::time::Instant::now();
        let mut checks = HashMap::new();

        checks.insert(
            "service".to_string(),
            HealthCheckResult {
                healthy: true,
                message: "Service is running".to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        HealthStatus {
            is_healthy: true,
            checks,
        }
    }

    async fn check_readiness(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}
