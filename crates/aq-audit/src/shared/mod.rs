//! Shared Module
//!
//! Cross-cutting HTTP concerns used by the audit routers.

pub mod error;
pub mod tenant;
pub mod health_api;

pub use error::{AuditError, ErrorResponse, Result};
pub use tenant::TenantScope;
pub use health_api::{health_router, HealthState};
