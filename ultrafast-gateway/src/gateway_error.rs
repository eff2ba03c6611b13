//! # Gateway Error Types Module
//!
//! This module defines the comprehensive error types for the Ultrafast Gateway,
//! providing standardized error handling and HTTP response mapping for all
//! gateway operations.
//!
//! ## Overview
//!
//! The error system provides:
//! - **Standardized Error Types**: Consistent error patterns across the gateway
//! - **HTTP Response Mapping**: Automatic conversion to appropriate HTTP status codes
//! - **Error Context**: Rich error information for debugging and monitoring
//! - **Error Propagation**: Proper error handling throughout the application
//! - **Client-Friendly Messages**: User-friendly error messages
//!
//! ## Error Categories
//!
//! The gateway defines several error categories:
//!
//! ### Client Errors
//! Errors originating from the client SDK:
//! - **Authentication Errors**: Invalid API keys or tokens
//! - **Rate Limit Errors**: Request or token limit violations
//! - **Invalid Request Errors**: Malformed or invalid requests
//! - **Network Errors**: Connection and communication failures
//!
//! ### Provider Errors
//! Errors from AI/LLM providers:
//! - **API Key Errors**: Invalid provider API keys
//! - **Rate Limit Errors**: Provider-specific rate limits
//! - **Quota Errors**: Provider quota exceeded
//! - **Model Errors**: Unsupported or unavailable models
//! - **Service Errors**: Provider service unavailability
//!
//! ### Gateway Errors
//! Internal gateway errors:
//! - **Authentication Errors**: Gateway authentication failures
//! - **Rate Limit Errors**: Gateway rate limiting
//! - **Content Filtering**: Content moderation failures
//! - **Configuration Errors**: Invalid gateway configuration
//! - **Cache Errors**: Caching operation failures
//! - **Plugin Errors**: Plugin execution failures
//!
//! ## HTTP Status Code Mapping
//!
//! Errors are automatically mapped to appropriate HTTP status codes:
//!
//! - **400 Bad Request**: Invalid requests and malformed data
//! - **401 Unauthorized**: Authentication and authorization failures
//! - **429 Too Many Requests**: Rate limit violations
//! - **500 Internal Server Error**: Internal gateway errors
//! - **503 Service Unavailable**: Provider or service unavailability
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::gateway_error::GatewayError;
//!
//! // Create specific error types
//! let auth_error = GatewayError::Auth {
//!     message: "Invalid API key".to_string(),
//! };
//!
//! let rate_limit_error = GatewayError::RateLimit {
//!     message: "Rate limit exceeded".to_string(),
//! };
//!
//! // Errors automatically convert to HTTP responses
//! let response = auth_error.into_response();
//! ```
//!
//! ## Error Handling
//!
//! The error system integrates with Axum for automatic HTTP response generation:
//!
//! ```rust
//! use axum::{Json, extract::State};
//! use ultrafast_gateway::gateway_error::GatewayError;
//!
//! async fn handler() -> Result<Json<Value>, GatewayError> {
//!     // Your handler logic here
//!     if some_condition {
//!         return Err(GatewayError::Auth {
//!             message: "Authentication required".to_string(),
//!         });
//!     }
//!     Ok(Json(json!({"status": "success"})))
//! }
//! ```
//!
//! ## Error Context
//!
//! Each error includes context for debugging and monitoring:
//!
//! - **Error Type**: Categorized error type for filtering
//! - **Error Message**: Human-readable error description
//! - **HTTP Status**: Appropriate HTTP status code
//! - **Error Code**: Machine-readable error identifier
//! - **Timestamp**: When the error occurred
//! - **Request ID**: Associated request identifier

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use ultrafast_models_sdk::error::{ClientError, ProviderError};

/// Comprehensive error types for the Ultrafast Gateway.
///
/// This enum defines all possible error types that can occur in the gateway,
/// including client errors, provider errors, and internal gateway errors.
/// Each error variant includes appropriate error messages and can be
/// automatically converted to HTTP responses.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Errors originating from the client SDK
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Errors from AI/LLM providers
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Gateway authentication and authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Missing `Authorization` header
    #[error("Missing authorization header")]
    MissingAuthorization,

    /// Authenticated principal lacks permission for the requested model/operation
    #[error("Insufficient permissions: {message}")]
    InsufficientPermissions { message: String },

    /// Invalid or malformed request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Requested resource (e.g. a model id) does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Rate limiting and quota violation errors
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Content filtering and moderation errors
    #[error("Content filtered: {message}")]
    ContentFiltered { message: String },

    /// Internal gateway server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// Service unavailability errors
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Configuration and setup errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON serialization and deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Plugin execution and management errors
    #[error("Plugin error: {message}")]
    Plugin { message: String },
}

/// `(http_status, error_type, error_code, param)` quadruple matching the
/// external error taxonomy: `type` is one of `invalid_request_error`,
/// `rate_limit_error`, `permission_error`, `server_error`; `code` is the
/// specific machine-readable reason within that type.
type ErrorClassification = (StatusCode, &'static str, &'static str, Option<&'static str>);

impl GatewayError {
    fn classify(&self) -> ErrorClassification {
        match self {
            GatewayError::Client(e) => match e {
                ClientError::Authentication { .. } => (
                    StatusCode::UNAUTHORIZED,
                    "invalid_request_error",
                    "invalid_api_key",
                    None,
                ),
                ClientError::RateLimit => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_error",
                    "rate_limit_exceeded",
                    None,
                ),
                ClientError::InvalidRequest { .. } => (
                    StatusCode::BAD_REQUEST,
                    "invalid_request_error",
                    "bad_request",
                    None,
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "service_unavailable",
                    None,
                ),
            },
            GatewayError::Provider(e) => match e {
                ProviderError::InvalidApiKey => (
                    StatusCode::UNAUTHORIZED,
                    "invalid_request_error",
                    "invalid_api_key",
                    None,
                ),
                ProviderError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "permission_error",
                    "insufficient_permissions",
                    None,
                ),
                ProviderError::RateLimit => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_error",
                    "rate_limit_exceeded",
                    None,
                ),
                ProviderError::QuotaExceeded => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limit_error",
                    "rate_limit_exceeded",
                    None,
                ),
                ProviderError::ModelNotFound { .. } => (
                    StatusCode::NOT_FOUND,
                    "invalid_request_error",
                    "bad_request",
                    Some("model"),
                ),
                ProviderError::ServiceUnavailable | ProviderError::RequestTimeout => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "server_error",
                    "service_unavailable",
                    None,
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "service_unavailable",
                    None,
                ),
            },
            GatewayError::MissingAuthorization => (
                StatusCode::UNAUTHORIZED,
                "invalid_request_error",
                "missing_authorization",
                None,
            ),
            GatewayError::Auth { .. } => (
                StatusCode::UNAUTHORIZED,
                "invalid_request_error",
                "invalid_api_key",
                None,
            ),
            GatewayError::InsufficientPermissions { .. } => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "insufficient_permissions",
                None,
            ),
            GatewayError::RateLimit { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                None,
            ),
            GatewayError::InvalidRequest { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                None,
            ),
            GatewayError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                Some("model"),
            ),
            GatewayError::ContentFiltered { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                None,
            ),
            GatewayError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "server_error",
                "service_unavailable",
                None,
            ),
            GatewayError::Internal { .. }
            | GatewayError::Config { .. }
            | GatewayError::Cache { .. }
            | GatewayError::Plugin { .. }
            | GatewayError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
                "service_unavailable",
                None,
            ),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, code, param) = self.classify();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "param": param,
                "code": code
            }
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }
        response
    }
}
