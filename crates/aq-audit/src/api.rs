//! Audit Events API
//!
//! Read-only REST endpoints over the audit event store: filtered listing,
//! single lookup, windowed statistics and CSV/JSON export.

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection as StatsQueryRejection},
        Path, Query, State,
    },
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::{Query as MultiQuery, QueryRejection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::entity::AuditEvent;
use crate::filter::{FilterParams, StatsParams};
use crate::service::{AuditEventPage, AuditQueryService};
use crate::shared::error::{AuditError, ErrorResponse, Result};
use crate::shared::tenant::TenantScope;
use crate::stats::AuditStats;

/// Statistics plus the window they were computed over
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditStatsResponse {
    #[serde(flatten)]
    pub stats: AuditStats,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Export request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExportRequest {
    /// `json` or `csv`, case-insensitive
    pub format: String,

    /// Same fields as the list query parameters; set fields are arrays
    #[serde(default)]
    pub filter: FilterParams,
}

#[derive(Clone)]
pub struct AuditState {
    pub service: AuditQueryService,
}

/// List audit events
#[utoipa::path(
    get,
    path = "/events",
    tag = "audit",
    operation_id = "listAuditEvents",
    params(
        FilterParams,
        ("X-Tenant-ID" = Option<String>, Header, description = "Tenant scope, omit for all tenants")
    ),
    responses(
        (status = 200, description = "Page of matching audit events", body = AuditEventPage),
        (status = 400, description = "Malformed query string", body = ErrorResponse),
        (status = 500, description = "Query failed", body = ErrorResponse)
    )
)]
pub async fn list_events(
    State(state): State<AuditState>,
    tenant: TenantScope,
    query: std::result::Result<MultiQuery<FilterParams>, QueryRejection>,
) -> Result<Json<AuditEventPage>> {
    let MultiQuery(params) = query.map_err(|e| AuditError::malformed(e.to_string()))?;

    let filter = state.service.normalize(tenant.tenant_id(), params);
    let page = state.service.resolve(&filter).await?;

    Ok(Json(page))
}

/// Get a single audit event
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "audit",
    operation_id = "getAuditEvent",
    params(
        ("id" = String, Path, description = "Audit event ID"),
        ("X-Tenant-ID" = Option<String>, Header, description = "Tenant scope, omit for all tenants")
    ),
    responses(
        (status = 200, description = "Audit event found", body = AuditEvent),
        (status = 404, description = "Audit event not found", body = ErrorResponse)
    )
)]
pub async fn get_event(
    State(state): State<AuditState>,
    tenant: TenantScope,
    Path(id): Path<String>,
) -> Result<Json<AuditEvent>> {
    let event = state.service.get_event(tenant.tenant_id(), &id).await?;
    Ok(Json(event))
}

/// Aggregate statistics over a time window
///
/// Missing or unparsable bounds default to the trailing statistics window.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "audit",
    operation_id = "getAuditStats",
    params(
        StatsParams,
        ("X-Tenant-ID" = Option<String>, Header, description = "Tenant scope, omit for all tenants")
    ),
    responses(
        (status = 200, description = "Audit statistics", body = AuditStatsResponse),
        (status = 400, description = "Malformed query or inverted window", body = ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<AuditState>,
    tenant: TenantScope,
    query: std::result::Result<Query<StatsParams>, StatsQueryRejection>,
) -> Result<Json<AuditStatsResponse>> {
    let Query(params) = query.map_err(|e| AuditError::malformed(e.body_text()))?;
    let range = state.service.stats_window(&params, Utc::now());
    let stats = state.service.aggregate(tenant.tenant_id(), &range).await?;

    let (start_date, end_date) = match (range.start, range.end) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(AuditError::internal("statistics window was not resolved")),
    };

    Ok(Json(AuditStatsResponse {
        stats,
        start_date,
        end_date,
    }))
}

/// Export audit events as CSV or JSON
#[utoipa::path(
    post,
    path = "/export",
    tag = "audit",
    operation_id = "exportAuditEvents",
    params(
        ("X-Tenant-ID" = Option<String>, Header, description = "Tenant scope, omit for all tenants")
    ),
    request_body = ExportRequest,
    responses(
        (status = 200, description = "Export file as text/csv or application/json attachment"),
        (status = 400, description = "Malformed body or unsupported format", body = ErrorResponse),
        (status = 500, description = "Query failed", body = ErrorResponse)
    )
)]
pub async fn export_events(
    State(state): State<AuditState>,
    tenant: TenantScope,
    body: std::result::Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(|e| AuditError::malformed(e.body_text()))?;

    let export = state
        .service
        .export(tenant.tenant_id(), &request.format, request.filter)
        .await?;

    let format = export.format();
    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format.content_disposition(Utc::now().date_naive()),
        ),
    ];

    Ok((headers, Body::from_stream(export.into_stream())).into_response())
}

/// Router mounted under `/api/audit`
pub fn audit_router(state: AuditState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_events))
        .routes(routes!(get_event))
        .routes(routes!(get_stats))
        .routes(routes!(export_events))
        .with_state(state)
}
