//! Payment messages exchanged between the orders and payments services.

use serde::{Deserialize, Serialize};

use crate::id::{OrderId, UserId};

/// Sent by orders when a new order needs to be charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    /// Amount in minor currency units.
    pub amount: i64,
    pub description: String,
}

/// Outcome of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Failed,
}

/// Sent by payments once a [`PaymentRequest`] has been settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PaymentResult {
    pub fn success(request: &PaymentRequest) -> Self {
        Self {
            order_id: request.order_id,
            user_id: request.user_id,
            status: PaymentStatus::Success,
            reason: None,
        }
    }

    pub fn failed(request: &PaymentRequest, reason: impl Into<String>) -> Self {
        Self {
            order_id: request.order_id,
            user_id: request.user_id,
            status: PaymentStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PaymentStatus::Success
    }
}
