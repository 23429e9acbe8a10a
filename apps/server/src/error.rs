use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ApiResponse;

/// Request-level error taxonomy. Everything here is surfaced to the caller;
/// notification failures are handled inside the notifier worker and never
/// reach this type.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input. Nothing was mutated.
    #[error("{0}")]
    Validation(String),

    /// Unknown entity id.
    #[error("{0} not found")]
    NotFound(String),

    /// Already refunded, membership already active, invalid session type.
    #[error("{0}")]
    Conflict(String),

    /// The processor does not report the session as paid yet.
    #[error("payment has not been completed")]
    PaymentIncomplete,

    /// Missing or wrong admin token.
    #[error("unauthorized")]
    Unauthorized,

    /// Processor not configured or the call failed; caller may retry.
    #[error("payment provider error: {0}")]
    Upstream(#[source] anyhow::Error),

    /// Storage or other internal failure.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentIncomplete => StatusCode::PAYMENT_REQUIRED,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            tracing::error!("internal error: {e:#}");
        }
        let status = self.status();
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            ApiError::validation("bad date").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_conflict_maps_to_409() {
        assert_eq!(
            ApiError::conflict("already refunded").status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_payment_incomplete_maps_to_402() {
        assert_eq!(
            ApiError::PaymentIncomplete.status(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_upstream_maps_to_502() {
        let e = ApiError::Upstream(anyhow::anyhow!("stripe 500"));
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            ApiError::not_found("appointment").to_string(),
            "appointment not found"
        );
    }
}
