//! Tenant scope extractor
//!
//! Identity is resolved upstream; the gateway forwards the caller's tenant
//! in `X-Tenant-ID`. A missing or blank header means a cross-tenant
//! (privileged) caller.

use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant the current request is scoped to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantScope(pub String);

impl TenantScope {
    pub fn cross_tenant() -> Self {
        Self(String::new())
    }

    pub fn is_cross_tenant(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tenant_id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        Ok(TenantScope(tenant))
    }
}
