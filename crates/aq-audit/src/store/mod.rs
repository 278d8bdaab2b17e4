//! Audit Event Store
//!
//! Contract the engine needs from the system of record, plus the shared
//! interpretation of sort hints that every backend applies.

use async_trait::async_trait;
use thiserror::Error;

use crate::entity::AuditEvent;
use crate::filter::{QueryFilter, SortHint, TimeRange};
use crate::stats::AuditStats;

pub mod memory;
pub mod mongo;

pub use memory::MemoryAuditStore;
pub use mongo::MongoAuditStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Audit event not found: {id}")]
    NotFound { id: String },

    /// The backend refuses part of the query (sort hint, pagination)
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery { message: message.into() }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One page of matching events plus the total match count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<AuditEvent>,
    pub total: i64,
}

/// Storage collaborator for audit events
#[async_trait]
pub trait AuditEventStore: Send + Sync {
    /// Matching, sorting and pagination per the filter. Empty sets do not
    /// constrain; non-empty sets match any member; the window is half-open.
    async fn query_events(&self, filter: &QueryFilter) -> StoreResult<EventPage>;

    /// Exact lookup, tenant-scoped when `tenant_id` is non-empty
    async fn get_event(&self, tenant_id: &str, event_id: &str) -> StoreResult<AuditEvent>;

    /// Aggregate over events with `created_at` in `range`
    async fn get_stats(&self, tenant_id: &str, range: &TimeRange) -> StoreResult<AuditStats>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> StoreResult<()>;

    fn name(&self) -> &'static str;
}

/// Sortable event fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    TenantId,
    UserId,
    UserEmail,
    Category,
    EventType,
    Action,
    Severity,
    Status,
    IpAddress,
}

impl SortField {
    fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "created_at" => SortField::CreatedAt,
            "tenant_id" => SortField::TenantId,
            "user_id" => SortField::UserId,
            "user_email" => SortField::UserEmail,
            "category" => SortField::Category,
            "event_type" => SortField::EventType,
            "action" => SortField::Action,
            "severity" => SortField::Severity,
            "status" => SortField::Status,
            "ip_address" => SortField::IpAddress,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Backend interpretation of a [`SortHint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortKey {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortKey {
    /// Newest first unless told otherwise; unknown fields or directions
    /// are rejected.
    pub fn parse(hint: &SortHint) -> StoreResult<Self> {
        let field = match hint.sort_by.as_deref() {
            None => SortField::CreatedAt,
            Some(raw) => SortField::parse(&raw.to_ascii_lowercase()).ok_or_else(|| {
                StoreError::invalid_query(format!("unsupported sort_by '{}'", raw))
            })?,
        };

        let direction = match hint.sort_direction.as_deref().map(str::to_ascii_lowercase) {
            None => SortDirection::Desc,
            Some(d) if d == "asc" => SortDirection::Asc,
            Some(d) if d == "desc" => SortDirection::Desc,
            Some(d) => {
                return Err(StoreError::invalid_query(format!(
                    "unsupported sort_direction '{}'",
                    d
                )))
            }
        };

        Ok(Self { field, direction })
    }
}

/// Pagination bounds every backend enforces
pub(crate) fn check_pagination(filter: &QueryFilter) -> StoreResult<(u64, i64)> {
    if filter.offset < 0 {
        return Err(StoreError::invalid_query(format!(
            "offset must not be negative (got {})",
            filter.offset
        )));
    }
    if filter.limit < 0 {
        return Err(StoreError::invalid_query(format!(
            "limit must not be negative (got {})",
            filter.limit
        )));
    }
    Ok((filter.offset as u64, filter.limit))
}
