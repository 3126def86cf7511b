use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    /// Database error
    Database(rusqlite::Error),
    /// Endpoint not found or inactive
    EndpointNotFound(String),
    /// Payment header present but failed schema validation (400, not 402)
    MalformedPayment(String),
    /// Request rejected before any lookup (bad query string etc.)
    InvalidRequest(String),
    /// Payment rejected by the facilitator (fallback; the orchestrator
    /// normally builds the 402 with `accepts` itself)
    PaymentFailed(String),
    /// Origin API returned non-2xx or the forward itself errored.
    /// `status` is the upstream status when one was received.
    OriginFailed {
        status: Option<u16>,
        message: String,
    },
    /// Origin call exceeded the endpoint-configured timeout
    OriginTimeout(u64),
    /// Stored credential failed to decrypt; calls to this endpoint are
    /// unusable until it is re-registered. Never exposed beyond a 500.
    CredentialCorruption(String),
    /// Invalid endpoint configuration
    InvalidConfig(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Database(e) => write!(f, "database error: {}", e),
            GatewayError::EndpointNotFound(id) => write!(f, "endpoint not found: {}", id),
            GatewayError::MalformedPayment(msg) => write!(f, "malformed payment: {}", msg),
            GatewayError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            GatewayError::PaymentFailed(msg) => write!(f, "payment failed: {}", msg),
            GatewayError::OriginFailed { status, message } => match status {
                Some(s) => write!(f, "origin returned {}: {}", s, message),
                None => write!(f, "origin request failed: {}", message),
            },
            GatewayError::OriginTimeout(secs) => {
                write!(f, "origin did not respond within {}s", secs)
            }
            GatewayError::CredentialCorruption(id) => {
                write!(f, "credential for endpoint {} failed to decrypt", id)
            }
            GatewayError::InvalidConfig(msg) => write!(f, "invalid endpoint config: {}", msg),
            GatewayError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Database(e)
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::EndpointNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MalformedPayment(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            GatewayError::OriginFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::OriginTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::CredentialCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::EndpointNotFound(id) => {
                HttpResponse::NotFound().json(serde_json::json!({
                    "error": "endpoint_not_found",
                    "message": format!("Endpoint '{}' not found", id)
                }))
            }
            GatewayError::MalformedPayment(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "malformed_payment",
                    "message": msg
                }))
            }
            GatewayError::InvalidRequest(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_request",
                    "message": msg
                }))
            }
            GatewayError::PaymentFailed(msg) => {
                HttpResponse::PaymentRequired().json(serde_json::json!({
                    "error": "payment_failed",
                    "message": msg
                }))
            }
            GatewayError::OriginFailed { status, message } => {
                tracing::warn!(upstream_status = ?status, "origin call failed: {}", message);
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "origin_error",
                    "message": "Upstream service returned an error",
                    "upstreamStatus": status,
                }))
            }
            GatewayError::OriginTimeout(secs) => {
                HttpResponse::GatewayTimeout().json(serde_json::json!({
                    "error": "origin_timeout",
                    "message": format!("Upstream service did not respond within {}s", secs)
                }))
            }
            GatewayError::CredentialCorruption(id) => {
                tracing::error!(provider = %id, "stored credential failed to decrypt; endpoint must be re-registered");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
            GatewayError::InvalidConfig(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_config",
                    "message": msg
                }))
            }
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
            GatewayError::Database(e) => {
                tracing::error!("Database error: {}", e);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}
