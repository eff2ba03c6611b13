//! # HTTP Middleware Module
//!
//! This module provides HTTP middleware components for the Ultrafast Gateway.
//! It includes authentication, logging, metrics collection, CORS handling,
//! and input validation middleware.
//!
//! ## Overview
//!
//! The middleware system provides:
//! - **Authentication Middleware**: API key and JWT token validation
//! - **Logging Middleware**: Request/response logging with context
//! - **Metrics Middleware**: Performance metrics collection
//! - **CORS Middleware**: Cross-origin resource sharing
//! - **Input Validation**: Request validation and sanitization
//! - **Plugin Middleware**: Dynamic request/response modification
//!
//! ## Middleware Stack Order
//!
//! The middleware is applied in the following order:
//!
//! 1. **Timeout Middleware**: Request timeout handling
//! 2. **CORS Middleware**: Cross-origin request handling
//! 3. **Logging Middleware**: Request/response logging
//! 4. **Metrics Middleware**: Performance tracking
//! 5. **Authentication Middleware**: API key validation
//! 6. **Input Validation Middleware**: Request validation
//! 7. **Plugin Middleware**: Dynamic modifications
//!
//! ## Authentication Middleware
//!
//! Handles API key and JWT token validation:
//!
//! - **API Key Extraction**: Extracts keys from headers
//! - **JWT Validation**: Validates JWT tokens
//! - **Rate Limiting**: Applies rate limits per user
//! - **Permission Checking**: Validates user permissions
//! - **Session Management**: Handles user sessions
//!
//! ## Logging Middleware
//!
//! Provides comprehensive request/response logging:
//!
//! - **Request Context**: Logs request method, URI, and headers
//! - **Response Status**: Tracks response status codes
//! - **Latency Tracking**: Measures request processing time
//! - **Request ID**: Unique request identifiers for tracing
//! - **Error Logging**: Detailed error information
//!
//! ## Metrics Middleware
//!
//! Collects performance metrics for each request:
//!
//! - **Request Metrics**: Method, path, status, latency
//! - **User Tracking**: User ID and session information
//! - **Provider Metrics**: Provider selection and performance
//! - **Cost Tracking**: Token usage and cost calculation
//! - **Error Metrics**: Error rates and types
//!
//! ## CORS Middleware
//!
//! Handles cross-origin resource sharing:
//!
//! - **Origin Validation**: Validates request origins
//! - **Method Allowance**: Controls allowed HTTP methods
//! - **Header Management**: Manages allowed headers
//! - **Preflight Handling**: Handles OPTIONS requests
//! - **Cache Control**: Manages CORS response caching
//!
//! ## Input Validation Middleware
//!
//! Validates and sanitizes request data:
//!
//! - **Request Validation**: Validates request structure
//! - **Content Sanitization**: Removes malicious content
//! - **Size Limits**: Enforces request size limits
//! - **Format Validation**: Validates data formats
//! - **Security Checks**: Performs security validations
//!
//! ## Plugin Middleware
//!
//! Provides dynamic request/response modification:
//!
//! - **Request Modification**: Modifies incoming requests
//! - **Response Modification**: Modifies outgoing responses
//! - **Content Filtering**: Filters request/response content
//! - **Custom Logic**: Executes custom plugin logic
//! - **Error Handling**: Handles plugin errors gracefully
//!
//! ## Usage
//!
//! ```rust
//! use ultrafast_gateway::middleware::{
//!     auth_middleware, cors_middleware, logging_middleware,
//!     metrics_middleware, input_validation_middleware
//! };
//!
//! // Apply middleware to router
//! let app = Router::new()
//!     .layer(cors_middleware(&cors_config))
//!     .layer(axum::middleware::from_fn(logging_middleware))
//!     .layer(axum::middleware::from_fn(metrics_middleware))
//!     .layer(axum::middleware::from_fn(auth_middleware))
//!     .layer(axum::middleware::from_fn(input_validation_middleware));
//! ```
//!
//! ## Configuration
//!
//! Middleware can be configured via the gateway configuration:
//!
//! ```toml
//! [server.cors]
//! enabled = true
//! allowed_origins = ["*"]
//! allowed_methods = ["GET", "POST", "PUT", "DELETE"]
//!
//! [auth]
//! enabled = true
//! jwt_secret = "your-secret"
//!
//! [metrics]
//! enabled = true
//! max_requests = 1000
//! ```
//!
//! ## Error Handling
//!
//! Each middleware includes comprehensive error handling:
//!
//! - **Authentication Errors**: Proper HTTP status codes
//! - **Validation Errors**: Detailed error messages
//! - **Rate Limit Errors**: Rate limit headers and responses
//! - **CORS Errors**: Proper CORS error responses
//! - **Plugin Errors**: Non-blocking plugin failures
//!
//! ## Performance Impact
//!
//! The middleware is designed for minimal performance impact:
//!
//! - **Efficient Logging**: Structured logging with minimal overhead
//! - **Async Operations**: Non-blocking async middleware
//! - **Caching**: Cached authentication and validation results
//! - **Selective Metrics**: Metrics collection only for relevant requests
//! - **Optimized Validation**: Fast validation algorithms

use crate::config::CorsConfig;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
// Unused imports removed - using dedicated modules now

pub mod input_validation;
pub mod plugin_middleware;

// Re-export the input validation middleware
pub use input_validation::input_validation_middleware;

/// Logging middleware for request/response tracking.
///
/// Logs detailed information about each request including method, URI,
/// status code, latency, and request ID for tracing.
///
/// # Arguments
///
/// * `_state` - Application state (unused in this middleware)
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware in the chain
///
/// # Returns
///
/// Returns the HTTP response with logging information.
///
/// # Example
///
/// ```rust
/// let app = Router::new()
///     .layer(axum::middleware::from_fn(logging_middleware));
/// ```
pub async fn logging_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    // Extract request context if available
    let ctx = req
        .extensions()
        .get::<crate::request_context::RequestContext>()
        .cloned();
    let request_id = ctx
        .as_ref()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let api_key_prefix = ctx
        .as_ref()
        .and_then(|ctx| ctx.api_key.as_deref())
        .map(crate::auth::mask_api_key)
        .unwrap_or_else(|| "none".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        api_key = %api_key_prefix,
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = latency.as_millis(),
        "Request processed"
    );

    response
}

/// Metrics middleware for performance tracking.
///
/// Collects performance metrics for each request including latency,
/// status codes, and user information. Skips metrics for dashboard
/// and health check endpoints.
///
/// # Arguments
///
/// * `_state` - Application state (unused in this middleware)
/// * `req` - The incoming HTTP request
/// * `next` - The next middleware in the chain
///
/// # Returns
///
/// Returns the HTTP response with metrics recorded.
///
/// # Example
///
/// ```rust
/// let app = Router::new()
///     .layer(axum::middleware::from_fn(metrics_middleware));
/// ```
pub async fn metrics_middleware(
    State(_state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let start = std::time::Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = uuid::Uuid::new_v4().to_string();

    // Add request ID to extensions for logging
    req.extensions_mut().insert(request_id.clone());

    let response = next.run(req).await;
    let latency = start.elapsed();
    let status = response.status();

    // Skip recording metrics for dashboard-related requests
    let should_record_metrics = !uri.path().starts_with("/dashboard")
        && !uri.path().starts_with("/metrics")
        && !uri.path().starts_with("/health")
        && !uri.path().starts_with("/ws/");

    if should_record_metrics {
        // Record metrics using the dedicated metrics module
        let metrics = crate::metrics::RequestMetricsBuilder::new(
            method.to_string(),
            uri.path().to_string(),
            status.as_u16(),
            latency,
        )
        .user_id(request_id.clone())
        .build();

        crate::metrics::record_request(metrics).await;

        // Log request ID for debugging
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status,
            latency_ms = latency.as_millis(),
            "Metrics recorded"
        );
    }

    response
}

// Legacy function - now using dedicated metrics module
pub async fn get_metrics() -> HashMap<String, serde_json::Value> {
    let aggregated = crate::metrics::get_aggregated_metrics().await;
    let mut result = HashMap::new();

    result.insert(
        "requests_per_minute".to_string(),
        serde_json::json!(aggregated.requests_per_minute),
    );
    result.insert(
        "average_latency_ms".to_string(),
        serde_json::json!(aggregated.average_latency_ms),
    );
    result.insert(
        "error_rate".to_string(),
        serde_json::json!(aggregated.error_rate),
    );
    result.insert(
        "active_connections".to_string(),
        serde_json::json!(aggregated.active_connections),
    );

    result
}

// Rate limiting now handled by auth module

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Allow OPTIONS requests (CORS preflight) without authentication
    if req.method() == http::Method::OPTIONS {
        return next.run(req).await;
    }

    if !state.config.auth.enabled {
        return next.run(req).await;
    }

    // Phase 3 Optimization: Async processing of authentication and validation
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let api_key = match crate::auth::AuthService::extract_api_key_from_header(auth_header) {
        Some(key) => key,
        None => return crate::gateway_error::GatewayError::MissingAuthorization.into_response(),
    };

    let auth_context = match crate::auth::validate_api_key_global(&api_key).await {
        Ok(context) => context,
        Err(e) => return e.into_response(),
    };

    // Apply the key's own limits rather than a blanket default, so
    // per-key `concurrent_requests`/rate_limit overrides actually bite.
    let rate_limits = auth_context.rate_limits.clone();
    let updated_limits =
        match crate::auth::check_rate_limits(&auth_context.user_id, rate_limits).await {
            Ok(updated) => updated,
            Err(e) => return e.into_response(),
        };

    // Peek the body for a client-supplied `request_id` so logs and the
    // overflow queue correlate with the caller's own identifier when one is
    // given, rather than always minting a fresh UUID. The body is restored
    // unchanged for the handler's own extractor.
    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return crate::gateway_error::GatewayError::InvalidRequest {
                message: format!("failed to read request body: {e}"),
            }
            .into_response()
        }
    };
    let client_request_id = serde_json::from_slice::<serde_json::Value>(&body_bytes)
        .ok()
        .and_then(|v| v.get("request_id").and_then(|id| id.as_str().map(str::to_string)));
    req = Request::from_parts(parts, Body::from(body_bytes));

    // Create request context with authentication info
    let request_context = crate::request_context::RequestContext::with_auth(
        Some(auth_context.user_id.clone()),
        Some(auth_context.api_key.clone()),
    )
    .with_request_id(client_request_id);

    // Inject request context and full auth context (needed by handlers for
    // per-model permission checks) into request extensions.
    req.extensions_mut().insert(request_context);
    req.extensions_mut().insert(auth_context);

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &updated_limits);
    response
}

/// Attach the `X-RateLimit-*` response headers from the post-admission
/// rate limit state, so callers can observe their remaining budget without
/// a separate introspection endpoint.
fn apply_rate_limit_headers(headers: &mut http::HeaderMap, limits: &crate::auth::RateLimits) {
    let remaining_requests = limits
        .requests_per_minute
        .saturating_sub(limits.current_minute_requests);
    let remaining_hour = limits
        .requests_per_hour
        .saturating_sub(limits.current_hour_requests);

    let insert = |headers: &mut http::HeaderMap, name: &'static str, value: u32| {
        if let Ok(v) = http::HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, v);
        }
    };

    let now_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let reset_requests = 60 - (now_secs % 60) as u32;
    let reset_requests_hour = 3600 - (now_secs % 3600) as u32;

    insert(headers, "x-ratelimit-limit-requests", limits.requests_per_minute);
    insert(headers, "x-ratelimit-remaining-requests", remaining_requests);
    insert(headers, "x-ratelimit-reset-requests", reset_requests);
    insert(headers, "x-ratelimit-limit-requests-hour", limits.requests_per_hour);
    insert(headers, "x-ratelimit-remaining-requests-hour", remaining_hour);
    insert(headers, "x-ratelimit-reset-requests-hour", reset_requests_hour);
}

pub fn cors_middleware(cors_config: &CorsConfig) -> CorsLayer {
    if !cors_config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new();

    if cors_config.allowed_origins.contains(&"*".to_string()) {
        cors = cors.allow_origin(Any);
    } else {
        for origin in &cors_config.allowed_origins {
            if let Ok(origin) = origin.parse::<http::header::HeaderValue>() {
                cors = cors.allow_origin(origin);
            }
        }
    }

    cors = cors.allow_methods(Any).allow_headers(Any);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(max_age);
    }

    cors
}
