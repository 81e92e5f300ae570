#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use shopflow_domain::id::{BillId, UserId};
use shopflow_domain::payment::{PaymentRequest, PaymentResult};

use crate::domain::types::Bill;
use crate::error::PaymentsServiceError;

/// Repository for bills.
pub trait BillRepository: Send + Sync {
    async fn create(&self, bill: &Bill) -> Result<(), PaymentsServiceError>;

    /// The bill, only when it belongs to `user_id`.
    async fn find_for_user(
        &self,
        id: BillId,
        user_id: UserId,
    ) -> Result<Option<Bill>, PaymentsServiceError>;

    /// Add `amount` to an active bill unless the balance would go negative.
    /// Returns the new balance, or `None` when the guard rejected the update.
    async fn adjust_balance(
        &self,
        id: BillId,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, PaymentsServiceError>;

    /// In one transaction: lock the user's first active bill, charge it and
    /// enqueue the resulting `payment.result` message.
    async fn charge_and_enqueue(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResult, PaymentsServiceError>;
}
