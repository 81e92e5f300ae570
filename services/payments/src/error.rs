use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Payments service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum PaymentsServiceError {
    #[error("bill not found")]
    BillNotFound,
    #[error("bill is not active")]
    BillInactive,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("bill changed concurrently")]
    Conflict,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl PaymentsServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BillNotFound => "BILL_NOT_FOUND",
            Self::BillInactive => "BILL_INACTIVE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::Conflict => "CONFLICT",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for PaymentsServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BillNotFound => StatusCode::NOT_FOUND,
            Self::BillInactive | Self::InsufficientFunds | Self::Conflict => StatusCode::CONFLICT,
            Self::InvalidAmount => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
