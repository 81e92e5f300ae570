use chrono::Utc;
use uuid::Uuid;

use shopflow_domain::id::{BillId, UserId};

use crate::domain::repository::BillRepository;
use crate::domain::types::{Bill, BillStatus, DEFAULT_CURRENCY};
use crate::error::PaymentsServiceError;

// ── CreateBill ───────────────────────────────────────────────────────────────

pub struct CreateBillUseCase<R: BillRepository> {
    pub repo: R,
}

impl<R: BillRepository> CreateBillUseCase<R> {
    pub async fn execute(&self, user_id: UserId) -> Result<Bill, PaymentsServiceError> {
        let now = Utc::now();
        let bill = Bill {
            id: BillId(Uuid::now_v7()),
            user_id,
            balance: 0,
            currency: DEFAULT_CURRENCY.to_owned(),
            status: BillStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&bill).await?;
        tracing::info!(bill_id = %bill.id, user_id = %user_id, "bill created");
        Ok(bill)
    }
}

// ── Deposit ──────────────────────────────────────────────────────────────────

pub struct DepositInput {
    pub bill_id: BillId,
    pub user_id: UserId,
    /// Negative amounts withdraw.
    pub amount: i64,
}

pub struct DepositUseCase<R: BillRepository> {
    pub repo: R,
}

impl<R: BillRepository> DepositUseCase<R> {
    /// Returns the new balance.
    pub async fn execute(&self, input: DepositInput) -> Result<i64, PaymentsServiceError> {
        if input.amount == 0 {
            return Err(PaymentsServiceError::InvalidAmount);
        }
        let bill = self
            .repo
            .find_for_user(input.bill_id, input.user_id)
            .await?
            .ok_or(PaymentsServiceError::BillNotFound)?;
        if !bill.is_active() {
            return Err(PaymentsServiceError::BillInactive);
        }
        match bill.balance.checked_add(input.amount) {
            None => return Err(PaymentsServiceError::InvalidAmount),
            Some(balance) if balance < 0 => return Err(PaymentsServiceError::InsufficientFunds),
            Some(_) => {}
        }

        self.repo
            .adjust_balance(bill.id, input.amount, Utc::now())
            .await?
            .ok_or(PaymentsServiceError::Conflict)
    }
}

// ── GetBalance ───────────────────────────────────────────────────────────────

pub struct GetBalanceUseCase<R: BillRepository> {
    pub repo: R,
}

impl<R: BillRepository> GetBalanceUseCase<R> {
    pub async fn execute(
        &self,
        bill_id: BillId,
        user_id: UserId,
    ) -> Result<Bill, PaymentsServiceError> {
        self.repo
            .find_for_user(bill_id, user_id)
            .await?
            .ok_or(PaymentsServiceError::BillNotFound)
    }
}
