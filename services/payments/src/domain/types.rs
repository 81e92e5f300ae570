use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use shopflow_domain::id::{BillId, UserId};
use shopflow_domain::payment::{PaymentRequest, PaymentResult};

pub const DEFAULT_CURRENCY: &str = "RUB";

pub const NO_ACTIVE_BILL: &str = "no active bill";
pub const INSUFFICIENT_FUNDS: &str = "insufficient funds";
pub const INVALID_AMOUNT: &str = "invalid amount";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillStatus {
    Active,
    Closed,
    Suspended,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "suspended" => Ok(Self::Suspended),
            other => Err(anyhow::anyhow!("unknown bill status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bill {
    pub id: BillId,
    pub user_id: UserId,
    /// Minor currency units.
    pub balance: i64,
    pub currency: String,
    pub status: BillStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn is_active(&self) -> bool {
        self.status == BillStatus::Active
    }
}

/// Balance change to persist alongside a successful charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debit {
    pub bill_id: BillId,
    pub new_balance: i64,
}

/// Outcome of charging `request` against the user's first active bill.
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub result: PaymentResult,
    pub debit: Option<Debit>,
}

pub fn charge(request: &PaymentRequest, bill: Option<&Bill>) -> Charge {
    let refuse = |reason: &str| Charge {
        result: PaymentResult::failed(request, reason),
        debit: None,
    };
    if request.amount <= 0 {
        return refuse(INVALID_AMOUNT);
    }
    let Some(bill) = bill.filter(|b| b.is_active()) else {
        return refuse(NO_ACTIVE_BILL);
    };
    match bill.balance.checked_sub(request.amount) {
        Some(new_balance) if new_balance >= 0 => Charge {
            result: PaymentResult::success(request),
            debit: Some(Debit {
                bill_id: bill.id,
                new_balance,
            }),
        },
        _ => refuse(INSUFFICIENT_FUNDS),
    }
}
