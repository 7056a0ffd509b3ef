//! HTTP error types with status code mapping.
//!
//! [`GatewayError`] is the error type of the HTTP routes. Each variant maps
//! to a specific HTTP status code and a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::ChainError;
use crate::persistence::LedgerError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2002,
///     "message": "transaction for contract 0x… is not FAILED",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                  |
/// |-----------|--------------------|------------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request              |
/// | 2000–2999 | Not Found/Conflict | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server             | 500 / 502                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The contract is not refunded on-chain.
    #[error("contract {0} is not refunded on-chain")]
    RefundNotConfirmed(String),

    /// No transaction exists for the contract id.
    #[error("transaction not found for contract {0}")]
    TransactionNotFound(String),

    /// The transaction is not in a state that allows the change.
    #[error("transaction for contract {0} is not FAILED")]
    InvalidTransition(String),

    /// Ledger failure.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Chain read failure.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::RefundNotConfirmed(_) => 1002,
            Self::TransactionNotFound(_) => 2001,
            Self::InvalidTransition(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Ledger(_) => 3001,
            Self::Chain(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::RefundNotConfirmed(_) => StatusCode::BAD_REQUEST,
            Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Ledger(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Chain(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_ranges() {
        assert_eq!(GatewayError::InvalidRequest(String::new()).error_code(), 1001);
        assert_eq!(GatewayError::TransactionNotFound(String::new()).error_code(), 2001);
        assert_eq!(
            GatewayError::InvalidTransition(String::new()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GatewayError::Ledger(LedgerError::Database("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_carries_status() {
        let response = GatewayError::InvalidTransition("0x01".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
