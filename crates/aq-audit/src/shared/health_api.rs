//! Health Check Endpoints
//!
//! - /health - overall status with a store check
//! - /health/live - liveness probe
//! - /health/ready - readiness probe (initialized and store reachable)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::store::AuditEventStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    /// Serving, but initialization has not finished
    Degraded,
}

/// Result of probing one dependency
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

#[derive(Clone)]
pub struct HealthState {
    pub store: Arc<dyn AuditEventStore>,
    pub version: Option<String>,
    pub started_at: DateTime<Utc>,
    ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(store: Arc<dyn AuditEventStore>, version: Option<String>) -> Self {
        Self {
            store,
            version,
            started_at: Utc::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark initialization (indexes, seeding) complete
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn check_store(&self) -> HealthCheck {
        let start = Instant::now();
        let result = self.store.ping().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => HealthCheck {
                name: self.store.name().to_string(),
                status: HealthStatus::Up,
                message: None,
                duration_ms,
            },
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Store health check failed");
                HealthCheck {
                    name: self.store.name().to_string(),
                    status: HealthStatus::Down,
                    message: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
    }
}

/// Combined health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<HealthState>) -> Response {
    let check = state.check_store().await;

    let status = match (check.status, state.is_ready()) {
        (HealthStatus::Down, _) => HealthStatus::Down,
        (_, false) => HealthStatus::Degraded,
        _ => HealthStatus::Up,
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        version: state.version.clone(),
        checks: vec![check],
    };

    (status_code(status), Json(response)).into_response()
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = SimpleHealthResponse)
    )
)]
pub async fn get_liveness() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: HealthStatus::Up,
    })
}

/// Readiness probe
///
/// 503 until initialization completes or while the store is unreachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = SimpleHealthResponse),
        (status = 503, description = "Service is not ready", body = SimpleHealthResponse)
    )
)]
pub async fn get_readiness(State(state): State<HealthState>) -> Response {
    let status = if state.is_ready() {
        state.check_store().await.status
    } else {
        HealthStatus::Down
    };

    (status_code(status), Json(SimpleHealthResponse { status })).into_response()
}

/// Router mounted under `/health`
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/live", get(get_liveness))
        .route("/ready", get(get_readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuditStore;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn state() -> HealthState {
        HealthState::new(Arc::new(MemoryAuditStore::new()), Some("0.1.0".to_string()))
    }

    #[test]
    fn test_health_status_serialization() {
        assert_eq!(serde_json::to_string(&HealthStatus::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).unwrap(), "\"DEGRADED\"");
    }

    #[tokio::test]
    async fn test_readiness_follows_ready_flag() {
        let state = state();
        let app = Router::new().nest("/health", health_router(state.clone()));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready();
        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_store_check() {
        let state = state();
        state.set_ready();

        let response = get_health(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "UP");
        assert_eq!(body["checks"][0]["name"], "memory");
        assert_eq!(body["version"], "0.1.0");
    }

    #[tokio::test]
    async fn test_liveness() {
        let Json(body) = get_liveness().await;
        assert_eq!(body.status, HealthStatus::Up);
    }
}
