use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Orders service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum OrdersServiceError {
    #[error("order not found")]
    OrderNotFound,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("invalid description")]
    InvalidDescription,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl OrdersServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidDescription => "INVALID_DESCRIPTION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for OrdersServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::OrderNotFound => StatusCode::NOT_FOUND,
            Self::InvalidAmount | Self::InvalidDescription => StatusCode::BAD_REQUEST,
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
