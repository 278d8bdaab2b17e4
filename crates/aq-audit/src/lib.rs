//! AuditQ Audit Engine
//!
//! Query, statistics and export over multi-tenant audit events:
//! - `filter` - request normalization into a [`QueryFilter`]
//! - `service` - query resolver and statistics aggregator
//! - `export` - streaming CSV/JSON rendering
//! - `store` - storage collaborator contract with memory and MongoDB backends
//! - `api` - axum/utoipa HTTP surface

pub mod entity;
pub mod filter;
pub mod stats;
pub mod export;
pub mod store;
pub mod service;
pub mod api;

// Shared infrastructure
pub mod shared;

// Development data
pub mod seed;

pub use shared::error::{AuditError, ErrorResponse, Result};
pub use shared::tenant::TenantScope;

pub use entity::{AuditCategory, AuditEvent, AuditSeverity, AuditStatus};
pub use filter::{FilterParams, QueryFilter, SortHint, StatsParams, TimeRange};
pub use stats::AuditStats;
pub use export::{Export, ExportFormat};
pub use store::{AuditEventStore, EventPage, MemoryAuditStore, MongoAuditStore, StoreError};
pub use service::{AuditEventPage, AuditQueryService};
pub use api::{audit_router, AuditState};
