//! AuditQ Server
//!
//! Serves the audit query, statistics and export API.
//!
//! Usage: `aq-server [config.toml]`
//!
//! Configuration is read from the given file, `AUDITQ_CONFIG`, or the
//! default search paths, then overridden by `AUDITQ_*` environment variables.
//!
//! Endpoints:
//! - /api/audit/events, /api/audit/events/{id}
//! - /api/audit/stats
//! - /api/audit/export
//! - /health, /health/live, /health/ready
//! - /q/openapi, /swagger-ui

use std::sync::Arc;

use anyhow::Result;
use axum::{http::HeaderValue, Router};
use chrono::Utc;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use aq_audit::seed::DevDataSeeder;
use aq_audit::shared::{health_router, HealthState};
use aq_audit::{
    audit_router, AuditEventStore, AuditQueryService, AuditState, MemoryAuditStore,
    MongoAuditStore,
};
use aq_config::{AppConfig, ConfigLoader, StorageBackend};

#[tokio::main]
async fn main() -> Result<()> {
    aq_common::logging::init_logging("aq-server");

    let loader = match std::env::args().nth(1) {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    info!(
        backend = ?config.storage.backend,
        dev_mode = config.dev_mode,
        "Starting AuditQ Server"
    );

    let store = build_store(&config).await?;
    info!(store = store.name(), "Audit store initialized");

    let health_state = HealthState::new(store.clone(), Some(env!("CARGO_PKG_VERSION").to_string()));
    let audit_state = AuditState {
        service: AuditQueryService::new(store, config.query.clone()),
    };

    let (router, mut openapi) = OpenApiRouter::new()
        .nest("/api/audit", audit_router(audit_state))
        .split_for_parts();

    openapi.info.title = "AuditQ API".to_string();
    openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
    openapi.info.description =
        Some("Query, statistics and export over multi-tenant audit events".to_string());

    let app = Router::new()
        .merge(router)
        .nest("/health", health_router(health_state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/q/openapi", openapi))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.http.cors_origins));

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    health_state.set_ready();
    info!("AuditQ Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("AuditQ Server shutdown complete");
    Ok(())
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn AuditEventStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let store = MemoryAuditStore::new();
            if config.dev_mode {
                DevDataSeeder::new(&store).seed(Utc::now());
            }
            Ok(Arc::new(store))
        }
        StorageBackend::Mongodb => {
            info!(
                database = %config.mongodb.database,
                collection = %config.mongodb.collection,
                "Connecting to MongoDB"
            );
            let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
            let db = client.database(&config.mongodb.database);
            let store = MongoAuditStore::new(&db, &config.mongodb.collection);

            if let Err(e) = store.ensure_indexes().await {
                warn!(error = %e, "Index creation failed; queries may be slow");
            }
            if config.dev_mode {
                warn!("dev_mode seeding only applies to the memory backend");
            }
            Ok(Arc::new(store))
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received...");
}
