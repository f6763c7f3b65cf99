//! # User-Sync Service
//!
//! Binary entry point for the user-sync HTTP service.
//!
//! This executable:
//! - Loads configuration from environment and files
//! - Initializes observability (logging)
//! - Creates the signature verifier, user store, and webhook processor
//! - Starts the HTTP server from user-sync-api

mod postgres_store;

use postgres_store::PostgresUserStore;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_sync_api::{
    start_server, DefaultHealthChecker, ServiceConfig, ServiceError,
};
use user_sync_core::{
    adapters::InMemoryUserStore,
    store::UserStore,
    webhook::{SharedSecretVerifier, WebhookProcessorImpl},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -------------------------------------------------------------------------
    // Load configuration
    //
    // Sources (applied in order — later sources override earlier ones):
    //  1. /etc/user-sync/service.yaml       — system-wide defaults
    //  2. ./config/service.yaml             — deployment-local override
    //  3. Path given by USYNC_CONFIG_FILE   — operator-specified file
    //  4. Environment variables prefixed USYNC__ (double-underscore
    //     separator), e.g. USYNC__SERVER__PORT=9090 sets server.port
    //
    // All configuration fields carry serde defaults, so absent files or an
    // entirely unconfigured environment still produce a config — which then
    // fails validation on the missing signing secret. A malformed file or
    // an environment variable that cannot be coerced to the right type IS a
    // hard error because it indicates deliberate-but-broken operator
    // configuration.
    //
    // Config loading happens before logging init so the logging section can
    // shape the subscriber; failures here go to stderr directly.
    // -------------------------------------------------------------------------
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/user-sync/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    // Optional explicit path supplied by the operator.
    let explicit_path = std::env::var("USYNC_CONFIG_FILE").ok().filter(|p| !p.is_empty());
    if let Some(path) = &explicit_path {
        config_builder = config_builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("USYNC").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to build configuration; aborting: {e}");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            eprintln!(
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart: {e}"
            );
            std::process::exit(3);
        }
    };

    // -------------------------------------------------------------------------
    // Initialize logging
    //
    // RUST_LOG wins when set; otherwise the configured level applies to the
    // service crates with tower_http at debug for request traces.
    // -------------------------------------------------------------------------
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &service_config.logging.level;
        tracing_subscriber::EnvFilter::new(format!(
            "user_sync_service={level},user_sync_api={level},user_sync_core={level},tower_http=debug"
        ))
    });

    if service_config.logging.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting User-Sync Service");
    if let Some(path) = &explicit_path {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    // -------------------------------------------------------------------------
    // Build the signature verifier from the configured shared secret
    // -------------------------------------------------------------------------
    let verifier = match SharedSecretVerifier::with_tolerance(
        &service_config.webhook.signing_secret,
        service_config.webhook.tolerance_seconds,
    ) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!(error = %e, "Signing secret is unusable; aborting");
            std::process::exit(3);
        }
    };

    // -------------------------------------------------------------------------
    // Build the user store
    //
    // The pool is established once here and shared by every request; the
    // in-memory fallback exists so local development works without a
    // database, at the cost of losing all records on restart.
    // -------------------------------------------------------------------------
    let store: Arc<dyn UserStore> = match &service_config.database.url {
        Some(url) => {
            match PostgresUserStore::connect(url, service_config.database.max_connections).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "Failed to connect to the user store; aborting");
                    std::process::exit(4);
                }
            }
        }
        None => {
            warn!(
                "No database URL configured — using the in-memory user store. \
                 Records are lost on restart; do not deploy this to production."
            );
            Arc::new(InMemoryUserStore::new())
        }
    };

    let processor = Arc::new(WebhookProcessorImpl::new(verifier, store.clone()));
    let health_checker = Arc::new(DefaultHealthChecker::new(store));

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        endpoint = %service_config.webhook.endpoint_path,
        "Starting HTTP server"
    );

    // Start the server
    if let Err(e) = start_server(service_config, processor, health_checker).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    Ok(())
}
