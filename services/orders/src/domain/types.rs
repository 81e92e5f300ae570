use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use shopflow_domain::id::{OrderId, UserId};
use shopflow_domain::payment::PaymentRequest;

pub const MAX_DESCRIPTION_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Waiting for a payment result.
    New,
    Finished,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Finished => "finished",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::New)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "finished" => Ok(Self::Finished),
            "canceled" => Ok(Self::Canceled),
            other => Err(anyhow::anyhow!("unknown order status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub amount: i64,
    pub description: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn payment_request(&self) -> PaymentRequest {
        PaymentRequest {
            order_id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            description: self.description.clone(),
        }
    }
}

pub fn validate_description(description: &str) -> bool {
    let trimmed = description.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_DESCRIPTION_LEN
}
