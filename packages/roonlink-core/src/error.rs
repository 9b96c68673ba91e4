//! Centralized error types for the RoonLink core library.
//!
//! Two layers:
//! - [`CoreError`] is what the Core-facing capabilities (session, image cache,
//!   preset resolver) return. It is `Clone` so coalesced waiters on a single
//!   upstream fetch can all receive the same failure.
//! - [`GatewayError`] is what HTTP handlers return. It wraps `CoreError` and adds
//!   the request-level failures, and implements `IntoResponse` so handler errors
//!   become JSON bodies with a machine-readable code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::roon::{SessionError, SessionState};

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "socket_bind_failed",
            Self::NoInterfaces => "no_network_interfaces",
            Self::DiscoveryTimeout { .. } => "discovery_timeout",
            Self::Connect(_) => "connect_failed",
            Self::Closed => "connection_closed",
            Self::Protocol(_) => "protocol_error",
            Self::Token(_) => "token_store_failed",
        }
    }
}

/// Failures of the Core-facing capabilities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The Core session cannot take requests right now.
    #[error("Roon Core unavailable: {0}")]
    ServiceUnavailable(String),

    /// The zone was never reported by the Core (or has been removed).
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// The Core has nothing matching the request (browse item, image key).
    #[error("Not found: {0}")]
    NotFound(String),

    /// No preset is declared for this slot.
    #[error("No preset declared for slot {0}")]
    UnknownPreset(u32),

    /// An awaited Core request did not complete within the request timeout.
    #[error("Roon Core did not answer {0} in time")]
    Timeout(String),

    /// The Core replied with something we could not interpret.
    #[error("Unexpected reply from Roon Core: {0}")]
    Protocol(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::UnknownZone(_) => "unknown_zone",
            Self::NotFound(_) => "not_found",
            Self::UnknownPreset(_) => "unknown_preset",
            Self::Timeout(_) => "upstream_timeout",
            Self::Protocol(_) => "upstream_error",
        }
    }
}

impl CoreError {
    /// Failure returned by every capability while the session is not connected.
    pub fn not_connected(state: SessionState) -> Self {
        Self::ServiceUnavailable(format!("session is {}", state))
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownZone(_) | Self::NotFound(_) | Self::UnknownPreset(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Protocol(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Application-wide error type for the HTTP gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A Core-facing capability failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No zone was given and none has been observed yet.
    #[error("No zone available: no zone_id given and the Core has not reported any zone")]
    NoZoneAvailable,

    /// The control action is not one of the supported verbs.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration rejected at bootstrap.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::NoZoneAvailable => "no_zone_available",
            Self::InvalidAction(_) => "invalid_action",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(e) => e.status_code(),
            Self::NoZoneAvailable => StatusCode::NOT_FOUND,
            Self::InvalidAction(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::roon::SessionResult;

/// Result alias for Core-facing capabilities.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result alias for gateway handlers and bootstrap.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
