//! Error types for Versegate services
//!
//! Provides a single error enum with:
//! - Distinct variants for transport, payload, protocol and cancellation failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    UnknownTool,

    // Resource errors (4xxx)
    NotFound,
    PassageNotFound,

    // Conflict errors (5xxx)
    TurnSuperseded,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    MalformedPayload,
    StreamProtocolError,
    AllProvidersFailed,

    // Cancellation
    Cancelled,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::UnknownTool => 1004,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::PassageNotFound => 4002,

            // Conflicts (5xxx)
            ErrorCode::TurnSuperseded => 5001,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::MalformedPayload => 8002,
            ErrorCode::StreamProtocolError => 8003,
            ErrorCode::AllProvidersFailed => 8004,

            ErrorCode::Cancelled => 8999,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Unknown tool: {tool}")]
    UnknownTool { tool: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Passage not found: {reference}")]
    PassageNotFound { reference: String },

    // Turn supervision
    #[error("Turn {turn_id} was superseded by a newer turn")]
    TurnSuperseded { turn_id: String },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // External service errors
    #[error("Upstream {endpoint} returned status {status}")]
    Upstream { status: u16, endpoint: String },

    #[error("Malformed payload from {source_name}: {message}")]
    MalformedPayload { source_name: String, message: String },

    #[error("Stream protocol error: {message}")]
    StreamProtocol { message: String },

    #[error("Every requested resource kind failed")]
    AllProvidersFailed,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Operation cancelled")]
    Cancelled,

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::UnknownTool { .. } => ErrorCode::UnknownTool,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::PassageNotFound { .. } => ErrorCode::PassageNotFound,
            AppError::TurnSuperseded { .. } => ErrorCode::TurnSuperseded,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::MalformedPayload { .. } => ErrorCode::MalformedPayload,
            AppError::StreamProtocol { .. } => ErrorCode::StreamProtocolError,
            AppError::AllProvidersFailed => ErrorCode::AllProvidersFailed,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. }
            | AppError::UnknownTool { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } | AppError::PassageNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::TurnSuperseded { .. } | AppError::Cancelled => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. }
            | AppError::MalformedPayload { .. }
            | AppError::StreamProtocol { .. }
            | AppError::AllProvidersFailed
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Transport and payload failures that callers recover from locally
    /// by treating the call as "no result".
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Upstream { .. }
                | AppError::HttpClient(_)
                | AppError::MalformedPayload { .. }
                | AppError::Serialization(_)
        )
    }

    /// Cancellation is silent: never logged as a failure, never shown to users
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::Cancelled | AppError::TurnSuperseded { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_cancellation() {
            tracing::debug!(error = %message, "Request cancelled");
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::PassageNotFound {
            reference: "John 99:1".into(),
        };
        assert_eq!(err.code(), ErrorCode::PassageNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_upstream_is_transient() {
        let err = AppError::Upstream {
            status: 503,
            endpoint: "/api/translation-notes".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code().as_code(), 8001);
    }

    #[test]
    fn test_cancellation_is_silent_client_error() {
        let err = AppError::Cancelled;
        assert!(err.is_cancellation());
        assert!(!err.is_transient());
        assert!(!err.is_server_error());
    }

    #[test]
    fn test_unavailable_and_unknown_tool_mapping() {
        let err = AppError::ServiceUnavailable {
            message: "resource service unreachable".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code().as_code(), 9999);

        let err = AppError::UnknownTool { tool: "show_map".into() };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "query too long".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_client_error());
    }
}
