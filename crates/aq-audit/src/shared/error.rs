//! Audit Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum AuditError {
    /// Structured request input could not be decoded
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    /// Opaque storage failure; details are logged, not returned
    #[error("Query failed: {message}")]
    QueryFailed { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AuditError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRequest { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuditError::MalformedRequest { .. } | AuditError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            AuditError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuditError::QueryFailed { .. } | AuditError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AuditError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            AuditError::Validation { .. } => "VALIDATION_ERROR",
            AuditError::NotFound { .. } => "NOT_FOUND",
            AuditError::QueryFailed { .. } => "QUERY_FAILED",
            AuditError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Error response body
#[derive(Debug, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuditError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuditError::malformed("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuditError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuditError::not_found("AuditEvent", "1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuditError::query_failed("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_format() {
        let err = AuditError::not_found("AuditEvent", "abc");
        assert_eq!(err.to_string(), "Entity not found: AuditEvent with id abc");
    }
}
